use std::sync::Arc;

use crate::commands::CommandResult;
use crate::poller::{run_poller, send_approved, PollerDeps};
use replyq_agent::{AnthropicClient, DraftComposer};
use replyq_core::config::{AppConfig, LoadOptions};
use replyq_db::repositories::{SqlDraftRepository, SqlLedgerRepository, SqlRunRepository};
use replyq_db::{connect, migrations};
use replyq_helpdesk::HelpdeskClient;

/// Which pass a `poll` invocation performs. `--send` switches the command to
/// sending approved drafts instead of polling.
#[derive(Debug, PartialEq, Eq)]
enum PollMode {
    Poll { lookback_hours: u32, dry_run: bool },
    SendApproved,
}

fn select_mode(hours: Option<u32>, default_hours: u32, dry_run: bool, send: bool) -> PollMode {
    if send {
        PollMode::SendApproved
    } else {
        PollMode::Poll { lookback_hours: hours.unwrap_or(default_hours), dry_run }
    }
}

pub fn run(hours: Option<u32>, dry_run: bool, send: bool) -> CommandResult {
    execute("poll", move |deps, config| async move {
        match select_mode(hours, config.poller.lookback_hours, dry_run, send) {
            PollMode::SendApproved => send_pass(&deps).await,
            PollMode::Poll { lookback_hours, dry_run } => {
                let outcome = run_poller(&deps, lookback_hours, dry_run).await?;
                let message = format!(
                    "poll pass finished: {} drafts created, {} skipped, {} errors",
                    outcome.counters.drafts_created,
                    outcome.counters.skipped,
                    outcome.counters.errors,
                );
                Ok((message, serde_json::to_value(&outcome)?))
            }
        }
    })
}

pub fn run_send_only() -> CommandResult {
    execute("send", |deps, _config| async move { send_pass(&deps).await })
}

async fn send_pass(deps: &PollerDeps) -> anyhow::Result<(String, serde_json::Value)> {
    let report = send_approved(deps).await?;
    let message =
        format!("sent {} approved drafts, {} failures", report.sent, report.errors.len());
    Ok((message, serde_json::to_value(&report)?))
}

fn execute<F, Fut>(command: &'static str, body: F) -> CommandResult
where
    F: FnOnce(PollerDeps, AppConfig) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<(String, serde_json::Value)>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database).await?;
        migrations::run_pending(&pool).await?;

        let helpdesk = HelpdeskClient::new(&config.helpdesk)?
            .with_limits(config.poller.list_page_size, config.poller.message_fetch_limit);
        let llm = AnthropicClient::new(&config.llm)?;

        let deps = PollerDeps {
            helpdesk: Arc::new(helpdesk),
            composer: DraftComposer::new(Arc::new(llm)),
            drafts: Arc::new(SqlDraftRepository::new(pool.clone())),
            ledger: Arc::new(SqlLedgerRepository::new(pool.clone())),
            runs: Arc::new(SqlRunRepository::new(pool.clone())),
        };

        let outcome = body(deps, config.clone()).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok((message, details)) => {
            CommandResult::success_with_details(command, message, Some(details))
        }
        Err(error) => CommandResult::failure(command, "poll_runtime", format!("{error:#}"), 4),
    }
}

fn init_logging(config: &AppConfig) {
    use replyq_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // A second init in the same process is fine to ignore.
    let result = match config.logging.format {
        Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
    let _ = result;
}
