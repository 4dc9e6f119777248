use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal client for the chatbot backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend base URL, e.g. http://localhost:8000/v1
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Directory holding the local store
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct PasswordArg {
    /// Read from stdin when omitted
    #[arg(long, env = "CHATBOT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with email and password
    Login {
        email: String,
        #[command(flatten)]
        password: PasswordArg,
    },
    /// Create an account and log in
    Register {
        email: String,
        /// Full name shown to admins
        #[arg(long)]
        name: String,
        #[command(flatten)]
        password: PasswordArg,
        /// Defaults to the password
        #[arg(long)]
        confirm_password: Option<String>,
    },
    /// End the current session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Show or update the profile
    Profile {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Conversations with the assistant
    #[command(subcommand)]
    Chat(ChatCommand),
    /// Knowledge base and usage administration
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Local settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
pub enum ChatCommand {
    /// List your conversations
    List,
    /// Print the messages of a conversation
    Show { id: String },
    /// Start a new conversation
    New { message: String },
    /// Continue a conversation
    Send { id: String, message: String },
    /// Rename a conversation
    Rename { id: String, title: String },
    /// Delete a conversation
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Upload files for training
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List training documents
    Docs,
    /// Queue a website for scraping
    Website { url: String },
    /// List website scraping jobs
    Websites,
    /// List users with chat stats
    Users,
    /// List conversations, or the messages of one
    Conversations {
        #[arg(long)]
        id: Option<String>,
    },
    /// Dashboard counters
    Stats,
    /// Ask the testing playground a question
    Test { message: String },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Show known settings
    List,
    /// Store a setting
    Set { key: String, value: String },
    /// Remove a stored setting
    Unset { key: String },
}
