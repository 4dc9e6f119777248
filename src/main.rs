use std::process::ExitCode;

fn main() -> ExitCode {
    chatbot_console_lib::run()
}
