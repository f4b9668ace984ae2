//! Command-line front end.
//!
//! Each mutating command runs load-snapshot → plan → apply-batch against the
//! SQLite store. Read commands print either styled text or JSON.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use console::style;
use tracing::{info, warn};

use crate::config::TaxographConfig;
use crate::error::{Result, TaxographError};
use crate::graph::cascade::{self, DeletePlan};
use crate::graph::cycles::find_cycles;
use crate::graph::index::GraphIndex;
use crate::graph::store::CategoryStore;
use crate::graph::traversal::{all_ancestor_paths, breadcrumbs, collect_descendants};
use crate::graph::tree::{build_trees_with, flatten_trees, TreeOptions};
use crate::observability::Metrics;
use crate::types::{BatchUpdate, Category, DeletePolicy, NewCategory};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "taxograph")]
#[command(about = "Multi-parent category hierarchy engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: ./taxograph.yaml, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides config and TAXOGRAPH_DB)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<String>,

    /// Log filter used when RUST_LOG is unset (overrides config)
    #[arg(long, global = true, value_name = "FILTER")]
    pub log: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Print run metrics as JSON to stderr when done
    #[arg(long, global = true)]
    pub metrics: bool,
}

impl Cli {
    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut TaxographConfig) {
        if let Some(db) = &self.db {
            config.database.path = db.clone();
        }
        if let Some(filter) = &self.log {
            config.logging.filter = filter.clone();
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an empty category database
    Init,

    /// Import categories from a JSON array and recompute derived fields
    Import {
        /// JSON file holding an array of category records
        file: PathBuf,
    },

    /// Print the category forest (each category under its primary parent)
    Tree {
        /// Hide inactive categories and everything beneath them
        #[arg(long)]
        active_only: bool,
    },

    /// List every descendant of a category
    Descendants { id: String },

    /// List every root-to-category path through every parent
    Ancestors { id: String },

    /// Show the canonical breadcrumb trail of a category
    Breadcrumbs { id: String },

    /// Create a category
    Create {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// URL slug (derived from the name when omitted)
        #[arg(long)]
        slug: Option<String>,
        /// Parent id; repeat for several parents, the first is primary
        #[arg(long = "parent", value_name = "ID")]
        parents: Vec<String>,
        #[arg(long, default_value_t = 0)]
        sort_order: i32,
        #[arg(long)]
        inactive: bool,
    },

    /// Replace a category's parent list (no --parent makes it a root)
    Reparent {
        id: String,
        /// Parent id; repeat for several parents, the first is primary
        #[arg(long = "parent", value_name = "ID")]
        parents: Vec<String>,
    },

    /// Change a category's slug and rewrite descendant paths
    RenameSlug { id: String, slug: String },

    /// Delete a category
    Delete {
        id: String,
        /// refuse | cascade | reparent-orphans (default from config)
        #[arg(long)]
        policy: Option<String>,
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Audit the stored graph for cycles and stale derived fields
    Check {
        /// Write the recomputed fields back when the graph is acyclic
        #[arg(long)]
        repair: bool,
    },
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// One CLI session: configuration, store and the metrics it accumulates.
pub struct App {
    pub config: TaxographConfig,
    pub store: CategoryStore,
    pub metrics: Metrics,
    json: bool,
    color: bool,
}

impl App {
    /// Open the configured database.
    pub fn open(config: TaxographConfig, json: bool) -> Result<Self> {
        let store = CategoryStore::new(&config.database.path)?;
        let color = console::colors_enabled();
        Ok(Self::with_store(config, store, json, color))
    }

    pub fn with_store(config: TaxographConfig, store: CategoryStore, json: bool, color: bool) -> Self {
        Self {
            config,
            store,
            metrics: Metrics::new(),
            json,
            color,
        }
    }

    /// Run one command and return what it prints on stdout.
    pub fn execute(&mut self, command: Command) -> Result<String> {
        let result = self.dispatch(command);
        match &result {
            Err(TaxographError::Cycle(_)) => self.metrics.cycles_rejected += 1,
            Err(TaxographError::Conflict(_)) => self.metrics.conflicts += 1,
            _ => {}
        }
        result
    }

    fn dispatch(&mut self, command: Command) -> Result<String> {
        match command {
            Command::Init => Ok(format!(
                "initialized {} ({} categories)",
                self.config.database.path,
                self.store.count()?
            )),
            Command::Import { file } => self.import(&file),
            Command::Tree { active_only } => self.tree(active_only),
            Command::Descendants { id } => self.descendants(&id),
            Command::Ancestors { id } => self.ancestors(&id),
            Command::Breadcrumbs { id } => self.breadcrumbs(&id),
            Command::Create {
                id,
                name,
                slug,
                parents,
                sort_order,
                inactive,
            } => {
                let index = self.load_index()?;
                let batch = cascade::plan_create(
                    NewCategory {
                        id: id.clone(),
                        name,
                        slug,
                        parent_ids: parents,
                        sort_order,
                        is_active: !inactive,
                        ..Default::default()
                    },
                    &index,
                )?;
                self.apply(&batch)?;
                self.report_batch(&format!("created {id}"), &batch)
            }
            Command::Reparent { id, parents } => {
                let index = self.load_index()?;
                let batch = cascade::reparent(&id, &parents, &index)?;
                self.metrics.reparents += 1;
                self.apply(&batch)?;
                self.report_batch(&format!("reparented {id}"), &batch)
            }
            Command::RenameSlug { id, slug } => {
                let index = self.load_index()?;
                let batch = cascade::change_slug(&id, &slug, &index)?;
                self.apply(&batch)?;
                self.report_batch(&format!("renamed {id} to {slug}"), &batch)
            }
            Command::Delete {
                id,
                policy,
                dry_run,
            } => self.delete(&id, policy.as_deref(), dry_run),
            Command::Check { repair } => self.check(repair),
        }
    }

    // -------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------

    fn load_index(&mut self) -> Result<GraphIndex> {
        let start = Instant::now();
        let index = self.store.load_index()?;
        self.metrics.snapshot_load = Some(start.elapsed());
        self.metrics.categories_loaded = index.len();
        Ok(index)
    }

    fn apply(&mut self, batch: &BatchUpdate) -> Result<usize> {
        let rows = self.store.apply_batch(batch)?;
        self.metrics.record_batch(batch, rows);
        Ok(rows)
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    fn report_batch(&self, headline: &str, batch: &BatchUpdate) -> Result<String> {
        if self.json {
            return Self::to_json(batch);
        }
        let mut out = format!(
            "{} ({} updated, {} counters, {} inserted, {} deleted)",
            style(headline).green().force_styling(self.color),
            batch.updates.len(),
            batch.counters.len(),
            batch.inserts.len(),
            batch.deletes.len(),
        );
        for u in &batch.updates {
            out.push_str(&format!(
                "\n  {} level={} {}",
                u.id,
                u.level,
                style(&u.path).dim().force_styling(self.color)
            ));
        }
        Ok(out)
    }

    fn require(index: &GraphIndex, id: &str) -> Result<()> {
        if index.contains(id) {
            Ok(())
        } else {
            Err(TaxographError::NotFound(id.to_string()))
        }
    }

    // -------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------

    fn import(&mut self, file: &std::path::Path) -> Result<String> {
        let text = std::fs::read_to_string(file)?;
        let records: Vec<Category> = serde_json::from_str(&text)?;

        // Validate and derive against snapshot + records in memory, so a
        // rejected import writes nothing.
        let mut merged: BTreeMap<String, Category> = self
            .store
            .load_snapshot()?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        for record in &records {
            merged.insert(record.id.clone(), record.clone());
        }
        let index = GraphIndex::build(merged.into_values());
        let cycles = find_cycles(&index);
        if !cycles.is_empty() {
            return Err(TaxographError::InvalidArgument(format!(
                "imported data contains {} cycle(s), first: {}",
                cycles.len(),
                cycles[0].category_ids.join(" -> ")
            )));
        }

        let repair = cascade::recompute_all(&index);
        let touched: HashSet<&str> = records
            .iter()
            .map(|c| c.id.as_str())
            .chain(repair.updates.iter().map(|u| u.id.as_str()))
            .chain(repair.counters.iter().map(|c| c.id.as_str()))
            .collect();
        let rows: Vec<Category> = repair
            .apply_to(index.iter().cloned())
            .into_iter()
            .filter(|c| touched.contains(c.id.as_str()))
            .collect();
        let written = self.store.insert_categories(&rows)?;
        self.metrics.batches_applied += 1;
        self.metrics.rows_written += written;
        info!(imported = records.len(), repaired = repair.len(), written, "import finished");

        Ok(format!(
            "imported {} categories ({} derived rows recomputed)",
            records.len(),
            repair.len()
        ))
    }

    fn tree(&mut self, active_only: bool) -> Result<String> {
        let snapshot = self.store.load_snapshot()?;
        let options = TreeOptions {
            include_inactive: self.config.tree.include_inactive && !active_only,
        };
        let trees = build_trees_with(&snapshot, &options);
        if self.json {
            return Self::to_json(&trees);
        }

        let active: std::collections::HashMap<&str, bool> =
            snapshot.iter().map(|c| (c.id.as_str(), c.is_active)).collect();
        let lines: Vec<String> = flatten_trees(&trees)
            .iter()
            .map(|entry| {
                let mut line = format!(
                    "{}{}  {}",
                    "  ".repeat(entry.depth),
                    style(&entry.name).bold().force_styling(self.color),
                    style(&entry.path).dim().force_styling(self.color)
                );
                if active.get(entry.id.as_str()) == Some(&false) {
                    line.push_str(&format!(
                        " {}",
                        style("(inactive)").yellow().force_styling(self.color)
                    ));
                }
                line
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn descendants(&mut self, id: &str) -> Result<String> {
        let index = self.load_index()?;
        Self::require(&index, id)?;
        let found = collect_descendants(id, &index);
        if self.json {
            return Self::to_json(&found);
        }
        Ok(found.into_iter().collect::<Vec<_>>().join("\n"))
    }

    fn ancestors(&mut self, id: &str) -> Result<String> {
        let index = self.load_index()?;
        Self::require(&index, id)?;
        let paths = all_ancestor_paths(id, &index);
        if self.json {
            return Self::to_json(&paths);
        }
        Ok(paths
            .iter()
            .map(|p| {
                p.iter()
                    .map(|step| index.name_of(step))
                    .collect::<Vec<_>>()
                    .join(" > ")
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn breadcrumbs(&mut self, id: &str) -> Result<String> {
        let index = self.load_index()?;
        Self::require(&index, id)?;
        let trail = breadcrumbs(id, &index);
        if self.json {
            return Self::to_json(&trail);
        }
        Ok(trail
            .iter()
            .map(|b| b.name.as_str())
            .collect::<Vec<_>>()
            .join(" / "))
    }

    fn delete(&mut self, id: &str, policy: Option<&str>, dry_run: bool) -> Result<String> {
        let policy = match policy {
            Some(raw) => DeletePolicy::from_str_loose(raw).ok_or_else(|| {
                TaxographError::InvalidArgument(format!("unknown delete policy '{raw}'"))
            })?,
            None => self.config.delete.default_policy,
        };
        let index = self.load_index()?;
        let plan: DeletePlan = cascade::plan_delete(id, policy, &index)?;

        if !plan.impact.descendants.is_empty() {
            warn!(
                category = %id,
                children = plan.impact.direct_children.len(),
                descendants = plan.impact.descendant_count(),
                "delete affects descendants"
            );
        }
        if !dry_run {
            self.apply(&plan.batch)?;
        }

        if self.json {
            return Self::to_json(&plan);
        }
        let verb = if dry_run { "would delete" } else { "deleted" };
        let mut out = format!(
            "{verb} {} category(ies) with policy {policy}; {} direct child(ren), {} descendant(s) affected",
            plan.batch.deletes.len(),
            plan.impact.direct_children.len(),
            plan.impact.descendant_count()
        );
        for u in &plan.batch.updates {
            out.push_str(&format!("\n  {} -> {}", u.id, u.path));
        }
        Ok(out)
    }

    fn check(&mut self, repair: bool) -> Result<String> {
        let index = self.load_index()?;
        let cycles = find_cycles(&index);
        let stale = cascade::recompute_all(&index);

        if repair {
            if !cycles.is_empty() {
                return Err(TaxographError::InvalidArgument(format!(
                    "refusing to repair: {} cycle(s) present",
                    cycles.len()
                )));
            }
            self.apply(&stale)?;
        }

        if self.json {
            return Self::to_json(&serde_json::json!({
                "categories": index.len(),
                "danglingRefs": index.dangling_refs(),
                "cycles": cycles.iter().map(|c| &c.category_ids).collect::<Vec<_>>(),
                "staleRows": stale.len(),
                "repaired": repair,
            }));
        }

        let mut out = format!(
            "{} categories, {} dangling parent reference(s), {} cycle(s), {} stale row(s)",
            index.len(),
            index.dangling_refs(),
            cycles.len(),
            stale.len()
        );
        for cycle in &cycles {
            out.push_str(&format!(
                "\n  {} {}",
                style("cycle:").red().force_styling(self.color),
                cycle.category_ids.join(" -> ")
            ));
        }
        if repair {
            out.push_str(&format!("\nrepaired {} row(s)", stale.len()));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
