use crate::cli::{Command, DatasourceCommand};
use crate::config::CliSettings;
use crate::shell::Shell;
use anyhow::{anyhow, bail, Context, Result};
use querydesk_core::gateway::{DatasourceKind, NewDatasource, UserSettings};
use querydesk_core::{ApiResponse, ChatSession, RouteDecision};
use std::io::{self, BufRead, Write};

/// Run one command. Returns an error when the gateway or local storage fails.
pub async fn run(shell: &Shell, settings: &mut CliSettings, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = password_or_prompt(password)?;
            let auth = shell.gateway.login(&email, &password).await.into_result()?;
            println!("Logged in as {} ({})", auth.email, auth.user_id);
        }
        Command::Register { email, password } => {
            let password = password_or_prompt(password)?;
            let auth = shell.gateway.register(&email, &password).await.into_result()?;
            println!("Account created for {}", auth.email);
        }
        Command::ForgotPassword { email } => {
            let notice = shell.gateway.forgot_password(&email).await.into_result()?;
            println!(
                "{}",
                notice
                    .message
                    .unwrap_or_else(|| format!("If {email} has an account, a reset link is on its way."))
            );
        }
        Command::Logout => {
            shell.gateway.logout()?;
        }
        Command::Whoami => match shell.session().user() {
            Some(user) => println!("{} ({})", user.email, user.user_id),
            None if shell.session().token().is_some() => println!("Signed in"),
            None => bail!("not signed in; run `querydesk login`"),
        },
        Command::Ask {
            question,
            datasource,
            conversation,
            no_stream,
        } => {
            let question = question.join(" ");
            let datasource = datasource.or_else(|| settings.default_datasource.clone());
            let chat = match conversation {
                Some(id) => ChatSession::resume(shell.gateway.clone(), &id, datasource).await?,
                None => ChatSession::new(shell.gateway.clone(), datasource),
            };
            if no_stream || !settings.stream_answers {
                ask_once(&chat, &question).await?;
            } else {
                ask_streaming(&chat, &question).await?;
            }
            if let Some(id) = chat.conversation().remote_id {
                settings.last_conversation = Some(id);
            }
        }
        Command::Schema { datasource } => {
            let id = datasource
                .or_else(|| settings.default_datasource.clone())
                .ok_or_else(|| anyhow!("no datasource given and no default configured"))?;
            let schema = shell.gateway.schema(&id).await.into_result()?;
            for table in schema.tables {
                let name = match &table.schema {
                    Some(schema) => format!("{schema}.{}", table.name),
                    None => table.name.clone(),
                };
                println!("{name}");
                for column in table.columns {
                    let nullable = if column.nullable { " null" } else { "" };
                    println!("  {} {}{}", column.name, column.data_type, nullable);
                }
            }
        }
        Command::History { id: None, .. } => {
            let conversations = shell.gateway.conversations().await.into_result()?;
            if conversations.is_empty() {
                println!("No conversations yet.");
            }
            for summary in conversations {
                println!(
                    "{}  {} ({} messages)",
                    summary.id, summary.title, summary.message_count
                );
            }
        }
        Command::History {
            id: Some(id),
            delete: true,
        } => {
            shell.gateway.delete_conversation(&id).await.into_result()?;
            if settings.last_conversation.as_deref() == Some(id.as_str()) {
                settings.last_conversation = None;
            }
            println!("Deleted conversation {id}");
        }
        Command::History {
            id: Some(id),
            delete: false,
        } => {
            let detail = shell.gateway.conversation(&id).await.into_result()?;
            println!("# {}", detail.title);
            for message in detail.messages {
                println!("[{:?}] {}", message.role, message.content);
                if let Some(sql) = message.sql {
                    println!("    {sql}");
                }
            }
        }
        Command::Datasources { command } => {
            run_datasource_command(shell, command.unwrap_or(DatasourceCommand::List)).await?
        }
        Command::Settings {
            display_name,
            default_datasource,
            row_limit,
        } => {
            let mut current = shell.gateway.settings().await.into_result()?;
            let changed = display_name.is_some() || default_datasource.is_some() || row_limit.is_some();
            if changed {
                let update = UserSettings {
                    display_name: display_name.or(current.display_name),
                    default_datasource_id: default_datasource.or(current.default_datasource_id),
                    row_limit: row_limit.or(current.row_limit),
                };
                current = shell.gateway.update_settings(&update).await.into_result()?;
                if let Some(id) = &current.default_datasource_id {
                    settings.default_datasource = Some(id.clone());
                }
            }
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        Command::Gate { path, cookie } => match gate_decision(shell, &path, cookie) {
            RouteDecision::Pass => println!("pass {path}"),
            RouteDecision::Redirect(location) => println!("redirect {location}"),
        },
    }
    Ok(())
}

/// How the route gate treats `path`, using the stored session cookie unless
/// `cookie` is given.
pub fn gate_decision(shell: &Shell, path: &str, cookie: Option<String>) -> RouteDecision {
    let cookie = cookie.or_else(|| shell.session().cookie_header());
    shell.gate.evaluate(path, cookie.as_deref())
}

async fn run_datasource_command(shell: &Shell, command: DatasourceCommand) -> Result<()> {
    match command {
        DatasourceCommand::List => {
            let datasources = shell.gateway.datasources().await.into_result()?;
            for datasource in datasources {
                println!(
                    "{}  {} [{:?}] {}",
                    datasource.id,
                    datasource.name,
                    datasource.kind,
                    datasource.database.unwrap_or_default()
                );
            }
        }
        DatasourceCommand::Add {
            name,
            kind,
            connection_string,
        } => {
            let kind = parse_kind(&kind)?;
            let created = shell
                .gateway
                .create_datasource(&NewDatasource {
                    name,
                    kind,
                    connection_string,
                })
                .await
                .into_result()?;
            println!("Added datasource {} ({})", created.name, created.id);
        }
        DatasourceCommand::Test { id } => {
            let check = shell.gateway.test_datasource(&id).await.into_result()?;
            let latency = check
                .latency_ms
                .map(|ms| format!(" in {ms} ms"))
                .unwrap_or_default();
            if check.ok {
                println!("Connection OK{latency}");
            } else {
                bail!(
                    "connection failed: {}",
                    check.message.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
        DatasourceCommand::Remove { id } => {
            shell.gateway.delete_datasource(&id).await.into_result()?;
            println!("Removed datasource {id}");
        }
    }
    Ok(())
}

async fn ask_once(chat: &ChatSession, question: &str) -> Result<()> {
    match chat.ask(question).await {
        Some(ApiResponse::Success(result)) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Some(ApiResponse::Failure(error)) => Err(error.into()),
        None => Ok(()),
    }
}

async fn ask_streaming(chat: &ChatSession, question: &str) -> Result<()> {
    let mut chunks = chat.ask_streaming(question).await?;
    let mut stdout = io::stdout();
    while let Some(chunk) = chunks.recv().await {
        let chunk = chunk?;
        if chunk.done {
            break;
        }
        stdout.write_all(chunk.delta.as_bytes())?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

pub fn parse_kind(kind: &str) -> Result<DatasourceKind> {
    serde_json::from_value(serde_json::Value::String(kind.to_ascii_lowercase()))
        .ok()
        .filter(|kind| *kind != DatasourceKind::Other)
        .ok_or_else(|| anyhow!("unsupported datasource kind `{kind}`"))
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprint!("Password: ");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("password cannot be empty");
    }
    Ok(password)
}
