//! Inspection CLI: runs single pipeline stages over JSON read from files or stdin.

use crate::attachment::SaveContext;
use crate::attachment::{HttpExtractionClient, NoopExtractionClient};
use crate::config::Settings;
use crate::context::RequestContext;
use crate::error::Result;
use crate::facets::{self, FieldDefinition};
use crate::query::router::{display_type, integrate_enabled};
use crate::query::{AggregationResults, FormContext, FormattedQuery, QueryRouter, SearchRequest, WeightingEngine};
use crate::record::ContentRecord;
use crate::results::{Hit, Presenter, matching_snippets, normalize};
use crate::sync::{MemoryContentStore, PreparedDocument, SyncTransformer, extend_protected_meta_keys};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cohort-search")]
#[command(about = "Inspect federated search routing, weighting and document preparation", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Route a listing/search request
    Route(RouteArgs),
    /// Route a request and reweight the backend query built for it
    Weight {
        #[command(flatten)]
        route: RouteArgs,
        /// Backend query body (`-` for stdin)
        #[arg(short, long)]
        query: PathBuf,
    },
    /// Prepare a content record for indexing
    Prepare {
        /// Content record (`-` for stdin)
        record: PathBuf,
        /// Content store snapshot with live content and thumbnails
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        autosave: bool,
        #[arg(long)]
        background_ajax: bool,
    },
    /// Present backend hits as result records
    Present {
        /// Array of hits (`-` for stdin)
        hits: PathBuf,
    },
    /// Route a request, then merge aggregation counts into its filter form
    Facets {
        #[command(flatten)]
        route: RouteArgs,
        /// Form field definitions keyed by field name
        #[arg(long)]
        fields: PathBuf,
        /// `aggregations` object of the backend response
        #[arg(long)]
        aggregations: PathBuf,
    },
    /// Load settings and report problems
    CheckConfig {
        /// Protected meta keys the host already indexes
        #[arg(long, value_delimiter = ',')]
        protected_keys: Vec<String>,
    },
}

#[derive(Args)]
pub struct RouteArgs {
    /// Request arguments (`-` for stdin)
    #[arg(short, long)]
    pub request: PathBuf,
    /// Widget context of the request
    #[arg(short, long)]
    pub form: Option<PathBuf>,
}

impl Cli {
    /// Settings from `--config`, else the default location, else built-in defaults.
    pub fn settings(&self) -> Result<Settings> {
        if let Some(path) = &self.config {
            return Settings::load(path).map_err(Into::into);
        }

        match Settings::default_path() {
            Some(path) if path.exists() => Ok(Settings::load(&path)?),
            _ => {
                tracing::warn!("No settings file found, using defaults");
                Ok(Settings::default())
            }
        }
    }

    pub async fn run(self) -> Result<()> {
        let settings = self.settings()?;

        let output = match self.command {
            Commands::Route(args) => {
                let mut ctx = RequestContext::new();
                route(&settings, &args, &mut ctx)?.summary
            }
            Commands::Weight { route: args, query } => {
                let mut ctx = RequestContext::new();
                let routed = route(&settings, &args, &mut ctx)?;
                let query: FormattedQuery = read_json(&query)?;
                let weighted = WeightingEngine::new(&settings).weight(query, &routed.request);
                Value::from(weighted)
            }
            Commands::Prepare {
                record,
                store,
                autosave,
                background_ajax,
            } => {
                let record: ContentRecord = read_json(&record)?;
                let store: MemoryContentStore = match store {
                    Some(path) => read_json(&path)?,
                    None => MemoryContentStore::default(),
                };
                let save = SaveContext {
                    autosave,
                    background_ajax,
                };
                prepare(&settings, store, record, save).await?
            }
            Commands::Present { hits } => {
                let hits: Vec<Hit> = read_json(&hits)?;
                present(&settings, hits)
            }
            Commands::Facets {
                route: args,
                fields,
                aggregations,
            } => {
                let mut ctx = RequestContext::new();
                let Routed { form, .. } = route(&settings, &args, &mut ctx)?;
                let mut fields: IndexMap<String, FieldDefinition> = read_json(&fields)?;
                let aggregations: Value = read_json(&aggregations)?;
                ctx.record_aggregations(AggregationResults::from_response(&aggregations));

                facets::merge(&mut fields, form.form_id().unwrap_or_default(), &ctx);
                if let Some(widget) = form.widget_type() {
                    facets::add_site_filter(&mut fields, &settings.registry(), widget);
                }
                serde_json::to_value(fields)?
            }
            Commands::CheckConfig { mut protected_keys } => {
                let warnings: Vec<String> = settings.validate().iter().map(ToString::to_string).collect();
                extend_protected_meta_keys(&mut protected_keys);
                json!({
                    "mode": settings.mode,
                    "local_tenant_id": settings.local_tenant_id,
                    "cohort": settings.registry().all_indices(),
                    "attachments_active": settings.attachments_active(),
                    "protected_meta_keys": protected_keys,
                    "warnings": warnings,
                })
            }
        };

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

/// A routed request with the widget context it was routed under.
struct Routed {
    request: SearchRequest,
    form: FormContext,
    summary: Value,
}

/// Reads each input once, so either may come from stdin.
fn route(settings: &Settings, args: &RouteArgs, ctx: &mut RequestContext) -> Result<Routed> {
    let mut request: SearchRequest = read_json(&args.request)?;
    let form: FormContext = read_optional(args.form.as_deref())?;

    let router = QueryRouter::new(settings);
    let routing = router.route(&mut request, &form, ctx);

    let summary = json!({
        "routing": format!("{:?}", routing),
        "integrate": integrate_enabled(&request),
        "search_path": router.search_path(&request),
        "display_type": display_type(form.widget_type().unwrap_or_default(), &request),
        "request": request,
    });
    Ok(Routed {
        request,
        form,
        summary,
    })
}

async fn prepare(
    settings: &Settings,
    store: MemoryContentStore,
    record: ContentRecord,
    save: SaveContext,
) -> Result<Value> {
    let (prepared, client) = match settings.attachments_endpoint.as_deref() {
        Some(endpoint) => {
            let client = HttpExtractionClient::new(endpoint)?;
            let transformer = SyncTransformer::new(settings, store, client.clone());
            (transformer.prepare(record, save), Some(client))
        }
        None => {
            let transformer = SyncTransformer::new(settings, store, NoopExtractionClient);
            (transformer.prepare(record, save), None)
        }
    };

    if let Some(client) = client {
        client.drain().await;
    }

    describe_write(settings, &prepared)
}

fn describe_write(settings: &Settings, prepared: &PreparedDocument) -> Result<Value> {
    Ok(json!({
        "method": prepared.write_mode.method(),
        "path": prepared.request_path(&settings.local_tenant_id),
        "body": prepared.request_body()?,
    }))
}

fn present(settings: &Settings, hits: Vec<Hit>) -> Value {
    let presenter = Presenter::new(settings);
    let records: Vec<Value> = hits
        .into_iter()
        .map(normalize)
        .map(|record| {
            let title = record
                .fields
                .get("post_title")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let local_link = record.permalink().unwrap_or_default();
            json!({
                "site_id": record.site_id,
                "local": presenter.is_local(&record),
                "title": presenter.title(&record, title),
                "permalink": presenter.permalink(&record, local_link),
                "classes": presenter.post_classes(&record, Vec::new()),
                "matching": matching_snippets(&record),
            })
        })
        .collect();
    Value::Array(records)
}

fn read_optional<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    path.map_or_else(|| Ok(T::default()), read_json)
}

/// Read JSON from `path`, or stdin when `path` is `-`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}
