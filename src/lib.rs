pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod session;

use clap::Parser;
use cli::{AdminCommand, ChatCommand, Cli, Commands, PasswordArg, SettingsCommand};
use commands::{admin, auth, chat, settings, AppContext};
use error::{AppError, AppResult};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> AppResult<()> {
    let ctx = AppContext::open(cli.data_dir, cli.base_url.as_deref())?;
    let mut out = io::stdout();

    match cli.command {
        Commands::Login { email, password } => {
            let password = read_password(password)?;
            auth::login(&ctx, &mut out, &email, &password).await
        }
        Commands::Register {
            email,
            name,
            password,
            confirm_password,
        } => {
            let password = read_password(password)?;
            let confirm = confirm_password.unwrap_or_else(|| password.clone());
            auth::register(&ctx, &mut out, &email, &name, &password, &confirm).await
        }
        Commands::Logout => auth::logout(&ctx, &mut out).await,
        Commands::Whoami => auth::whoami(&ctx, &mut out).await,
        Commands::Profile { email, name } => {
            auth::profile(&ctx, &mut out, email.as_deref(), name.as_deref()).await
        }
        Commands::Chat(cmd) => match cmd {
            ChatCommand::List => chat::list_conversations(&ctx, &mut out).await,
            ChatCommand::Show { id } => chat::show_conversation(&ctx, &mut out, &id).await,
            ChatCommand::New { message } => chat::new_conversation(&ctx, &mut out, &message).await,
            ChatCommand::Send { id, message } => {
                chat::send_message(&ctx, &mut out, &id, &message).await
            }
            ChatCommand::Rename { id, title } => {
                chat::rename_conversation(&ctx, &mut out, &id, &title).await
            }
            ChatCommand::Delete { id } => chat::delete_conversation(&ctx, &mut out, &id).await,
        },
        Commands::Admin(cmd) => match cmd {
            AdminCommand::Upload { files } => admin::upload(&ctx, &mut out, &files).await,
            AdminCommand::Docs => admin::list_documents(&ctx, &mut out).await,
            AdminCommand::Website { url } => admin::train_website(&ctx, &mut out, &url).await,
            AdminCommand::Websites => admin::list_websites(&ctx, &mut out).await,
            AdminCommand::Users => admin::list_users(&ctx, &mut out).await,
            AdminCommand::Conversations { id } => {
                admin::list_conversations(&ctx, &mut out, id.as_deref()).await
            }
            AdminCommand::Stats => admin::stats(&ctx, &mut out).await,
            AdminCommand::Test { message } => admin::playground(&ctx, &mut out, &message).await,
        },
        Commands::Settings(cmd) => match cmd {
            SettingsCommand::List => settings::list_settings(&ctx, &mut out),
            SettingsCommand::Set { key, value } => {
                settings::set_setting(&ctx, &mut out, &key, &value)
            }
            SettingsCommand::Unset { key } => settings::unset_setting(&ctx, &mut out, &key),
        },
    }
}

fn read_password(arg: PasswordArg) -> AppResult<String> {
    if let Some(password) = arg.password {
        return Ok(password);
    }
    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(AppError::Invalid("Password is required".into()));
    }
    Ok(password)
}
