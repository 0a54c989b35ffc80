use std::sync::Arc;

use thiserror::Error;

use replyq_core::config::{AppConfig, ConfigError};
use replyq_db::repositories::SqlDraftRepository;
use replyq_db::{connect, migrations, DbPool};
use replyq_helpdesk::{HelpdeskClient, HelpdeskError};

use crate::api::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration failure: {0}")]
    Config(#[from] ConfigError),
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failure: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("helpdesk client failure: {0}")]
    Helpdesk(#[from] HelpdeskError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect(&config.database).await?;
    migrations::run_pending(&db_pool).await?;

    let helpdesk = HelpdeskClient::new(&config.helpdesk)?
        .with_limits(config.poller.list_page_size, config.poller.message_fetch_limit);

    let state = AppState {
        drafts: Arc::new(SqlDraftRepository::new(db_pool.clone())),
        helpdesk: Arc::new(helpdesk),
    };

    Ok(Application { config, db_pool, state })
}
