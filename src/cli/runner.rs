//! CLI runner - executes commands

use crate::auth::{Authenticator, OAuth2Config};
use crate::catalog;
use crate::cli::commands::{Cli, Commands};
use crate::config::{ClientCredentials, Settings, DEFAULT_CONFIG_FILE};
use crate::database::StagingDatabase;
use crate::engine::{EntityDescriptor, RunController};
use crate::error::{Error, Result, ResultExt};
use crate::http::{HttpClient, HttpClientConfig};
use crate::ledger::{FailureLedger, RunLedger};
use crate::reprocess::Reprocessor;
use crate::source::ApiEntitySource;
use crate::state::WatermarkStore;
use crate::types::{Clock, LoadMode, SystemClock};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run {
                entity,
                full,
                incremental,
            } => {
                let forced = match (*full, *incremental) {
                    (true, _) => Some(LoadMode::Full),
                    (_, true) => Some(LoadMode::Incremental),
                    _ => None,
                };
                self.run_entities(entity, forced).await
            }
            Commands::Reprocess {
                entity,
                ids,
                all_unresolved,
            } => self.reprocess(entity.as_deref(), ids, *all_unresolved).await,
            Commands::Failures { entity, all } => self.failures(entity.as_deref(), *all),
            Commands::Watermarks => self.watermarks(),
            Commands::Runs { limit } => self.runs(*limit),
            Commands::Check => self.check().await,
            Commands::Entities => self.entities(),
            Commands::InitToken { code, redirect_uri } => {
                self.init_token(code, redirect_uri).await
            }
        }
    }

    /// Load, override and validate settings
    fn load_settings(&self) -> Result<Settings> {
        let mut settings = match &self.cli.config {
            Some(path) => Settings::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Settings::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Settings::default(),
        }
        .apply_env();

        if let Some(path) = &self.cli.database {
            settings.database.path = path.clone();
        }
        settings.validate()?;
        Ok(settings)
    }

    fn open_database(settings: &Settings) -> Result<Arc<StagingDatabase>> {
        let path = &settings.database.path;
        let db = StagingDatabase::open(path)
            .with_context(|| format!("Failed to open staging database {path}"))?;
        Ok(Arc::new(db))
    }

    fn authenticator(settings: &Settings, db: Arc<StagingDatabase>) -> Result<Authenticator> {
        let credentials = ClientCredentials::from_env()?;
        let config = OAuth2Config::new(settings.api.token_url.clone(), credentials);
        Ok(Authenticator::new(config, db))
    }

    /// Authenticated API client
    fn build_client(settings: &Settings, db: Arc<StagingDatabase>) -> Result<Arc<HttpClient>> {
        let authenticator = Self::authenticator(settings, db)?;
        let config = HttpClientConfig::from_settings(&settings.api, settings.base_url()?);
        let client = HttpClient::with_config(config)?.with_credentials(Arc::new(authenticator));
        Ok(Arc::new(client))
    }

    /// Descriptors for `names`, or the enabled set when empty
    fn descriptors(
        settings: &Settings,
        client: &Arc<HttpClient>,
        names: &[String],
    ) -> Result<Vec<EntityDescriptor>> {
        let names = if names.is_empty() {
            settings.entities.enabled.as_slice()
        } else {
            names
        };
        let specs = catalog::select(names)?;
        Ok(specs
            .into_iter()
            .map(|spec| {
                let source = Arc::new(ApiEntitySource::new(client.clone(), spec.endpoint));
                EntityDescriptor::from_spec(spec, source)
                    .with_override(settings.entity_override(spec.name))
            })
            .collect())
    }

    /// Run each selected entity; fails if any run failed
    async fn run_entities(&self, names: &[String], forced: Option<LoadMode>) -> Result<()> {
        let settings = self.load_settings()?;
        let db = Self::open_database(&settings)?;
        let client = Self::build_client(&settings, db.clone())?;

        let mut entities = Self::descriptors(&settings, &client, names)?;
        if let Some(mode) = forced {
            entities = entities.into_iter().map(|e| e.with_mode(mode)).collect();
        }

        let options = settings.load_options(SystemClock.now())?;
        let controller = RunController::new(options, db.clone(), db.clone(), db.clone(), db);

        let outcomes = controller.run_all(&entities).await;
        let mut failed = 0;
        for (entity, outcome) in &outcomes {
            match outcome {
                Ok(report) => output(&json!({ "entity": entity, "status": "finished", "report": report })),
                Err(e) => {
                    failed += 1;
                    output(&json!({ "entity": entity, "status": "error", "error": e.to_string() }));
                }
            }
        }

        if failed > 0 {
            return Err(Error::Other(format!(
                "{failed} of {} entity runs failed",
                outcomes.len()
            )));
        }
        info!(entities = outcomes.len(), "All runs finished");
        Ok(())
    }

    async fn reprocess(
        &self,
        entity: Option<&str>,
        ids: &[String],
        all_unresolved: bool,
    ) -> Result<()> {
        let settings = self.load_settings()?;
        let db = Self::open_database(&settings)?;
        let client = Self::build_client(&settings, db.clone())?;
        let reprocessor = Reprocessor::new(db.clone(), db.clone(), db);

        if all_unresolved {
            let names: Vec<String> = match entity {
                Some(name) => vec![name.to_string()],
                None => catalog::names().into_iter().map(String::from).collect(),
            };
            let entities = Self::descriptors(&settings, &client, &names)?;
            let reports = reprocessor.reprocess_all_unresolved(&entities).await?;
            output(&reports);
            return Ok(());
        }

        let name = entity.ok_or_else(|| Error::missing_field("entity"))?;
        if ids.is_empty() {
            warn!(entity = name, "No ids given, nothing to reprocess");
            return Ok(());
        }
        let descriptor = Self::descriptors(&settings, &client, &[name.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::unknown_entity(name))?;
        let report = reprocessor.reprocess(&descriptor, ids).await?;
        output(&report);
        Ok(())
    }

    fn failures(&self, entity: Option<&str>, all: bool) -> Result<()> {
        let settings = self.load_settings()?;
        let db = Self::open_database(&settings)?;
        let failures = if all {
            db.all(entity)?
        } else {
            db.unresolved(entity)?
        };
        output(&failures);
        Ok(())
    }

    fn watermarks(&self) -> Result<()> {
        let settings = self.load_settings()?;
        let db = Self::open_database(&settings)?;
        output(&db.list()?);
        Ok(())
    }

    fn runs(&self, limit: usize) -> Result<()> {
        let settings = self.load_settings()?;
        let db = Self::open_database(&settings)?;
        output(&db.recent(limit)?);
        Ok(())
    }

    /// Validate settings, open the database and call the API once
    async fn check(&self) -> Result<()> {
        let settings = self.load_settings()?;
        catalog::select(&settings.entities.enabled)?;
        let db = Self::open_database(&settings)?;
        db.check()?;

        let client = Self::build_client(&settings, db)?;
        let me = client.get_json("usuarios/me", &[]).await?;
        let user = me.get("data").cloned().unwrap_or(me);

        output(&json!({
            "status": "SUCCEEDED",
            "database": settings.database.path,
            "user": user,
        }));
        Ok(())
    }

    fn entities(&self) -> Result<()> {
        let settings = self.load_settings()?;
        let enabled = &settings.entities.enabled;
        let listing: Vec<_> = catalog::catalog()
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "physical_table": spec.physical_table,
                    "supports_incremental": spec.supports_incremental,
                    "page_size": spec.page_size,
                    "batch_size": spec.batch_size,
                    "enabled": enabled.is_empty() || enabled.iter().any(|e| e == spec.name),
                })
            })
            .collect();
        output(&listing);
        Ok(())
    }

    async fn init_token(&self, code: &str, redirect_uri: &str) -> Result<()> {
        let settings = self.load_settings()?;
        let db = Self::open_database(&settings)?;
        let authenticator = Self::authenticator(&settings, db)?;
        let tokens = authenticator.exchange_code(code, redirect_uri).await?;
        info!(expires_at = tokens.expires_at, "Token stored");
        output(&json!({ "status": "SUCCEEDED", "expires_at": tokens.expires_at }));
        Ok(())
    }
}

/// Print a value as pretty JSON on stdout
fn output<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => warn!(error = %e, "Could not serialize output"),
    }
}
