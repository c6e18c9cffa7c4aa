mod cli;
mod core;
mod terminal;
mod tui;

#[cfg(test)]
mod test_fixtures;

use clap::Parser;
use crate::cli::{Cli, Commands};
use crate::core::api::{HttpMailApi, MailApi};
use crate::core::config::{ClientConfig, ConfigService};
use crate::core::models::DataPath;
use crate::core::poller::PollSettings;
use crate::core::session::{MailSession, SessionOptions};
use crate::terminal::StdTerminal;
use std::fs;
use std::io;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> io::Result<()> {
    let data_path = DataPath::new(cli.data_path)?;
    fs::create_dir_all(&data_path.root)?;
    init_logging(&data_path, matches!(cli.command, Commands::Browse))?;

    let mut terminal = StdTerminal;

    if let Commands::Config { command } = &cli.command {
        return cli::handle_config_command(&data_path, command, &mut terminal);
    }

    let config = ConfigService::load_config(&data_path)?;
    let api: Arc<dyn MailApi> = Arc::new(HttpMailApi::new(&config)?);

    match &cli.command {
        Commands::Accounts => cli::handle_accounts_command(api.as_ref(), &mut terminal).await,
        Commands::Emails { account } => {
            cli::handle_emails_command(api.as_ref(), account.as_deref(), &mut terminal).await
        }
        Commands::Show { id } => cli::handle_show_command(api.as_ref(), id, &mut terminal).await,
        Commands::Status => cli::handle_status_command(api.as_ref(), &config, &mut terminal).await,
        Commands::Fetch { account } => {
            let mut session = command_session(api, &config);
            cli::handle_fetch_command(&mut session, account.as_deref(), &mut terminal).await
        }
        Commands::Search { query } => {
            let mut session = command_session(api, &config);
            cli::handle_search_command(&mut session, query, &mut terminal).await
        }
        Commands::Notifications { clear } => {
            let mut session = command_session(api, &config);
            cli::handle_notifications_command(&mut session, *clear, &mut terminal).await
        }
        Commands::Browse => {
            let session = MailSession::new(
                api,
                PollSettings::from(&config.polling),
                SessionOptions {
                    notifications: config.ui.notifications,
                },
            );
            let mut browser = tui::MailBrowser::new(session, config.theme.clone());
            browser.run().await
        }
        Commands::Config { .. } => Ok(()),
    }
}

/// Session for one-shot commands: no periodic notification refresh.
fn command_session(api: Arc<dyn MailApi>, config: &ClientConfig) -> MailSession {
    MailSession::new(
        api,
        PollSettings::from(&config.polling),
        SessionOptions {
            notifications: false,
        },
    )
}

/// Log to stderr at `warn` unless `RUST_LOG` says otherwise. The browser owns
/// the terminal, so it logs to a file in the data directory instead.
fn init_logging(data_path: &DataPath, to_file: bool) -> io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));

    if to_file {
        let log_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(data_path.log_path())?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    // A second init only happens in tests; keep the first logger.
    let _ = builder.try_init();
    Ok(())
}
