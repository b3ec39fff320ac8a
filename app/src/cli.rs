use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "querydesk", version, about = "Ask your databases questions in plain language")]
pub struct Cli {
    /// Gateway base URL. Overrides NEXT_PUBLIC_API_URL and querydesk.yaml.
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    /// Directory holding the persisted session.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session token.
    Login {
        email: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and sign in.
    Register {
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Request a password reset email.
    ForgotPassword { email: String },
    /// Forget the stored session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Ask a question about your data.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
        #[arg(long)]
        datasource: Option<String>,
        /// Continue a conversation stored on the gateway.
        #[arg(long)]
        conversation: Option<String>,
        /// Return the generated SQL as JSON instead of streaming prose.
        #[arg(long)]
        no_stream: bool,
    },
    /// Print the tables and columns of a datasource.
    Schema { datasource: Option<String> },
    /// List conversations, or show one.
    History {
        id: Option<String>,
        #[arg(long, requires = "id")]
        delete: bool,
    },
    /// Manage datasources.
    Datasources {
        #[command(subcommand)]
        command: Option<DatasourceCommand>,
    },
    /// Show or update account settings.
    Settings {
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        default_datasource: Option<String>,
        #[arg(long)]
        row_limit: Option<u32>,
    },
    /// Show how the route gate treats a page path.
    Gate {
        path: String,
        /// Cookie header to evaluate. Defaults to the stored session cookie.
        #[arg(long)]
        cookie: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DatasourceCommand {
    List,
    Add {
        name: String,
        /// postgres, mysql, sqlite, snowflake or bigquery.
        #[arg(long)]
        kind: String,
        #[arg(long)]
        connection_string: String,
    },
    Test { id: String },
    Remove { id: String },
}
