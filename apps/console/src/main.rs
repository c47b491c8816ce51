use std::{
    io::{self, BufRead, Write},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ControllerSnapshot, Dispatch, HttpResourceClient, Outcome, ResourceController,
    FAILURE_PREFIX,
};
use shared::domain::{User, UserField, UserId};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(about = "Inspect and edit the remote user directory")]
struct Args {
    /// Overrides the configured server origin, e.g. http://localhost:5000
    #[arg(long)]
    server_url: Option<String>,
    /// Request timeout in seconds; 0 disables it.
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every user.
    List,
    /// Fetch one user by id.
    Get { id: i64 },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Replace both fields of a user; omitted flags keep the current value.
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Change a single field.
    Patch {
        id: i64,
        field: UserField,
        value: String,
    },
    Delete {
        id: i64,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        settings.request_timeout_secs = timeout_secs;
    }

    debug!(
        server_url = %settings.server_url,
        timeout_secs = settings.request_timeout_secs,
        "connecting to user directory"
    );
    let client = match settings.request_timeout() {
        Some(timeout) => HttpResourceClient::with_timeout(&settings.server_url, timeout),
        None => HttpResourceClient::new(&settings.server_url),
    }
    .context("failed to configure user directory client")?;
    let controller = ResourceController::initialize(Arc::new(client)).await;
    if controller.status().await.last_outcome == Outcome::Failure {
        print_snapshot(&controller.snapshot().await);
        return Ok(ExitCode::FAILURE);
    }

    let dispatch = run_command(&controller, args.command).await?;
    print_snapshot(&controller.snapshot().await);

    Ok(match dispatch {
        Dispatch::Succeeded => ExitCode::SUCCESS,
        Dispatch::Failed | Dispatch::Busy => ExitCode::FAILURE,
    })
}

async fn run_command(controller: &ResourceController, command: Command) -> Result<Dispatch> {
    let dispatch = match command {
        // Initialization already listed the collection.
        Command::List => Dispatch::Succeeded,
        Command::Get { id } => controller.get_one(UserId(id)).await,
        Command::Create { name, email } => {
            controller.set_draft_field(UserField::Name, name).await;
            controller.set_draft_field(UserField::Email, email).await;
            controller.submit().await
        }
        Command::Update { id, name, email } => {
            let Some(user) = find_user(&controller.users().await, UserId(id)) else {
                println!("{FAILURE_PREFIX} User {id} is not in the collection");
                return Ok(Dispatch::Failed);
            };
            controller.start_edit(&user).await;
            if let Some(name) = name {
                controller.set_draft_field(UserField::Name, name).await;
            }
            if let Some(email) = email {
                controller.set_draft_field(UserField::Email, email).await;
            }
            controller.submit().await
        }
        Command::Patch { id, field, value } => {
            controller.partial_modify(UserId(id), field, &value).await
        }
        Command::Delete { id, yes } => {
            let stdin = io::stdin();
            let confirmed = yes
                || confirm(
                    "Are you sure you want to delete this user? [y/N] ",
                    &mut stdin.lock(),
                    &mut io::stdout(),
                )
                .context("failed to read confirmation")?;
            if !confirmed {
                println!("Delete cancelled");
                return Ok(Dispatch::Failed);
            }
            controller.remove(UserId(id)).await
        }
    };
    Ok(dispatch)
}

fn find_user(users: &[User], user_id: UserId) -> Option<User> {
    users.iter().find(|u| u.id == user_id).cloned()
}

fn confirm(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    write!(output, "{prompt}")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn print_snapshot(snapshot: &ControllerSnapshot) {
    if !snapshot.status.last_message.is_empty() {
        println!("{}", snapshot.status.last_message);
    }
    print!("{}", render_users(&snapshot.users));
}

fn render_users(users: &[User]) -> String {
    let id_width = users
        .iter()
        .map(|u| u.id.to_string().len())
        .max()
        .unwrap_or(0)
        .max(2);
    let name_width = users
        .iter()
        .map(|u| u.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    let mut out = format!("{:>id_width$}  {:<name_width$}  EMAIL\n", "ID", "NAME");
    for user in users {
        out.push_str(&format!(
            "{:>id_width$}  {:<name_width$}  {}\n",
            user.id.0, user.name, user.email
        ));
    }
    out
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
