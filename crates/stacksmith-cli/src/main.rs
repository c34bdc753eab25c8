//! stacksmith - split a monolithic change into a validated stack
//!
//! ## Commands
//!
//! - `run`: drive the whole pipeline end to end
//! - `analyze`: classify the changeset and print the dependency summary
//! - `plan`: produce and persist the partition plan
//! - `materialize`: turn planned partitions into validated branches
//! - `replan`: re-plan the unpushed remainder after a halt
//! - `audit`: score the materialized stack
//! - `consolidate`: merge too-small partitions into a neighbor
//! - `remote-fix`: repair a pushed partition from a failure log
//! - `report`: render the markdown stack summary

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::Level;

use stacksmith_checks::{discover_checks, Validator};
use stacksmith_core::{
    audit, consolidate, plan, read_plan_doc, replan, write_plan_doc, write_report, Analyzer,
    AutoApprove, CheckValidator, Checkpoint, GitCli, MaterializeConfig, Materializer,
    MergeNeighborPolicy, Orchestrator, OrchestratorConfig, PartitionValidator, PipelineStage,
    PlanDocument, RemoteFixOutcome, Session, StackError, Vcs, PLAN_DOC_FILE,
};

#[derive(Parser)]
#[command(name = "stacksmith")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Split a monolithic change into a dependency-ordered stack", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Reference holding the monolithic change
    #[arg(long, global = true, default_value = "HEAD")]
    source: String,

    /// Reference the stack is built on
    #[arg(long, global = true, default_value = "main")]
    base: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the whole pipeline: analyze, plan, materialize, audit,
    /// consolidate, report
    Run {
        /// Approve every stage transition without prompting
        #[arg(short, long)]
        yes: bool,

        /// Size threshold below which partitions are flagged too-small
        #[arg(long, default_value_t = 40)]
        min_lines: u64,

        /// Materialize and validate without pushing
        #[arg(long)]
        no_push: bool,

        /// Skip the consolidation stage
        #[arg(long)]
        no_consolidate: bool,

        /// Merge too-small partitions into their successor instead of
        /// their predecessor
        #[arg(long)]
        prefer_successor: bool,
    },

    /// Classify the changeset and print the dependency summary
    Analyze,

    /// Produce and persist the partition plan
    Plan,

    /// Materialize planned partitions as validated branches
    Materialize {
        #[arg(long, default_value_t = 40)]
        min_lines: u64,

        #[arg(long)]
        no_push: bool,
    },

    /// Re-plan the unpushed remainder of the persisted plan
    Replan,

    /// Audit the materialized stack and persist the findings
    Audit,

    /// Merge too-small partitions into a neighbor
    Consolidate {
        #[arg(long)]
        prefer_successor: bool,
    },

    /// Repair a pushed partition from a remotely observed failure log
    RemoteFix {
        /// Partition branch name
        partition: String,

        /// Path to the failure log ("-" for stdin)
        #[arg(long, default_value = "-")]
        log: String,
    },

    /// Render the markdown stack summary
    Report,
}

/// Checkpoint that prompts on the terminal before each stage.
struct ConsoleCheckpoint;

#[async_trait]
impl Checkpoint for ConsoleCheckpoint {
    async fn confirm(
        &self,
        from: PipelineStage,
        to: PipelineStage,
    ) -> stacksmith_core::Result<bool> {
        print!("Proceed {from:?} -> {to:?}? [y/N] ");
        std::io::stdout().flush().map_err(StackError::Io)?;
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(StackError::Io)?;
        Ok(matches!(line.trim(), "y" | "Y" | "yes"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    stacksmith_core::init_tracing(cli.json, level);

    if !stacksmith_core::is_git_repo(&cli.repo) {
        anyhow::bail!("{} is not a git repository", cli.repo.display());
    }

    let vcs: Arc<dyn Vcs> = Arc::new(GitCli::new(&cli.repo));
    let doc_path = cli.repo.join(PLAN_DOC_FILE);

    match cli.command {
        Commands::Run {
            yes,
            min_lines,
            no_push,
            no_consolidate,
            prefer_successor,
        } => {
            let checkpoint: Arc<dyn Checkpoint> = if yes {
                Arc::new(AutoApprove)
            } else {
                Arc::new(ConsoleCheckpoint)
            };
            let orchestrator = Orchestrator::new(
                vcs,
                validator(&cli.repo)?,
                checkpoint,
                OrchestratorConfig {
                    source_ref: cli.source.clone(),
                    base_ref: cli.base.clone(),
                    doc_path,
                    materialize: MaterializeConfig {
                        min_partition_lines: min_lines,
                        push: !no_push,
                    },
                    consolidate: !no_consolidate,
                    merge_policy: policy(prefer_successor),
                },
            );
            let session = orchestrator.run().await?;
            println!("Pipeline finished at stage {:?}", session.stage);
            if let Some(plan) = &session.plan {
                for partition in &plan.partitions {
                    println!(
                        "  {} [{:?}] {} files",
                        partition.name,
                        partition.status,
                        partition.files.len()
                    );
                }
            }
            Ok(())
        }
        Commands::Analyze => cmd_analyze(&vcs, &cli.source, &cli.base),
        Commands::Plan => cmd_plan(&vcs, &cli.source, &cli.base, &doc_path),
        Commands::Materialize { min_lines, no_push } => {
            cmd_materialize(
                vcs.clone(),
                validator(&cli.repo)?,
                &doc_path,
                MaterializeConfig {
                    min_partition_lines: min_lines,
                    push: !no_push,
                },
            )
            .await
        }
        Commands::Replan => cmd_replan(&vcs, &doc_path),
        Commands::Audit => cmd_audit(&vcs, &doc_path),
        Commands::Consolidate { prefer_successor } => {
            cmd_consolidate(&vcs, &doc_path, policy(prefer_successor))
        }
        Commands::RemoteFix { partition, log } => {
            let failure_log = if log == "-" {
                std::io::read_to_string(std::io::stdin()).context("read failure log from stdin")?
            } else {
                std::fs::read_to_string(&log)
                    .with_context(|| format!("read failure log from {log}"))?
            };
            let orchestrator = Orchestrator::new(
                vcs,
                validator(&cli.repo)?,
                Arc::new(AutoApprove),
                OrchestratorConfig {
                    source_ref: cli.source.clone(),
                    base_ref: cli.base.clone(),
                    doc_path,
                    materialize: MaterializeConfig::default(),
                    consolidate: false,
                    merge_policy: MergeNeighborPolicy::PreferPredecessor,
                },
            );
            match orchestrator.remote_fix(&partition, &failure_log).await? {
                RemoteFixOutcome::Repaired { revalidated, .. } => {
                    println!("Repaired; re-validated {}", revalidated.join(", "));
                    Ok(())
                }
                RemoteFixOutcome::Conflicted {
                    partition, reason, ..
                } => {
                    anyhow::bail!("propagation stopped at {partition}: {reason}")
                }
                RemoteFixOutcome::NotApplicable { record } => {
                    anyhow::bail!(
                        "failure is not auto-fixable ({:?}: {})",
                        record.failure_class,
                        record.artifact
                    )
                }
            }
        }
        Commands::Report => cmd_report(&doc_path),
    }
}

fn policy(prefer_successor: bool) -> MergeNeighborPolicy {
    if prefer_successor {
        MergeNeighborPolicy::PreferSuccessor
    } else {
        MergeNeighborPolicy::PreferPredecessor
    }
}

/// Build the production validator from the discovered check set.
fn validator(repo: &std::path::Path) -> Result<Arc<dyn PartitionValidator>> {
    let checks = discover_checks(repo)?;
    Ok(Arc::new(CheckValidator::new(Validator::new(checks, repo))))
}

fn cmd_analyze(vcs: &Arc<dyn Vcs>, source: &str, base: &str) -> Result<()> {
    let analysis = Analyzer::new(vcs.clone()).analyze(source, base)?;
    println!(
        "{} changed files, {} import edges",
        analysis.graph.file_count(),
        analysis.graph.edge_count()
    );
    for file in &analysis.files {
        println!("  [{}] {} ({} lines)", file.tag.slug(), file.path, file.lines);
        for import in &file.imports {
            println!("      -> {import}");
        }
    }
    Ok(())
}

fn cmd_plan(vcs: &Arc<dyn Vcs>, source: &str, base: &str, doc_path: &std::path::Path) -> Result<()> {
    // Pin the source to a sha so later checkouts (partition branches)
    // cannot shift what a symbolic ref like HEAD points at.
    let backup = vcs.rev_parse(source)?;
    let analysis = Analyzer::new(vcs.clone()).analyze(&backup, base)?;
    let stack = plan(&analysis, &backup, base)?;

    let session = Session::new(backup)
        .advance(PipelineStage::Plan)?
        .with_plan(stack);
    let doc = PlanDocument::new(session)
        .with_summary(stacksmith_core::AnalysisSummary::of(&analysis));
    write_plan_doc(doc_path, &doc)?;

    let plan = doc.session.plan.as_ref().context("plan was just created")?;
    println!("Planned {} partitions:", plan.partitions.len());
    for partition in &plan.partitions {
        println!("  {} <- {} ({} files)", partition.name, partition.base, partition.files.len());
    }
    println!("Plan written to {}", doc_path.display());
    Ok(())
}

async fn cmd_materialize(
    vcs: Arc<dyn Vcs>,
    validator: Arc<dyn PartitionValidator>,
    doc_path: &std::path::Path,
    config: MaterializeConfig,
) -> Result<()> {
    let mut doc = read_plan_doc(doc_path)?;
    let plan = doc
        .session
        .plan
        .as_mut()
        .context("plan document has no plan; run `stacksmith plan` first")?;

    let materializer = Materializer::new(vcs, validator, config);
    let outcome = materializer.materialize(plan).await?;
    doc.session = advance_if_legal(&doc.session, PipelineStage::Materialize);
    write_plan_doc(doc_path, &doc)?;

    for name in &outcome.completed {
        println!("  validated {name}");
    }
    if let Some(failed) = outcome.failed {
        anyhow::bail!("halted at {failed}; run `stacksmith replan` to continue");
    }
    Ok(())
}

fn cmd_replan(vcs: &Arc<dyn Vcs>, doc_path: &std::path::Path) -> Result<()> {
    let mut doc = read_plan_doc(doc_path)?;
    let current = doc
        .session
        .plan
        .clone()
        .context("plan document has no plan")?;

    let analysis = Analyzer::new(vcs.clone()).analyze(&current.source_ref, &current.base_ref)?;
    let replanned = replan(&current, &analysis)?;
    let kept = replanned.pushed_prefix_len();

    doc.session = doc.session.with_plan(replanned);
    doc.session = advance_if_legal(&doc.session, PipelineStage::Replan);
    write_plan_doc(doc_path, &doc)?;
    println!(
        "Re-planned: {} partitions kept, {} total",
        kept,
        doc.session.plan.as_ref().map(|p| p.partitions.len()).unwrap_or(0)
    );
    Ok(())
}

fn cmd_audit(vcs: &Arc<dyn Vcs>, doc_path: &std::path::Path) -> Result<()> {
    let mut doc = read_plan_doc(doc_path)?;
    let plan = doc
        .session
        .plan
        .clone()
        .context("plan document has no plan")?;

    let analysis = Analyzer::new(vcs.clone()).analyze(&plan.source_ref, &plan.base_ref)?;
    let stack_audit = audit(&plan, &analysis);

    println!("Stack score: {}/100", stack_audit.score);
    for finding in &stack_audit.findings {
        if finding.flags.is_empty() {
            println!("  {} clean", finding.partition);
        } else {
            println!("  {} {:?}", finding.partition, finding.flags);
            for note in &finding.notes {
                println!("    - {note}");
            }
        }
    }

    doc.audit = Some(stack_audit);
    write_plan_doc(doc_path, &doc)?;
    Ok(())
}

fn cmd_consolidate(
    vcs: &Arc<dyn Vcs>,
    doc_path: &std::path::Path,
    policy: MergeNeighborPolicy,
) -> Result<()> {
    let mut doc = read_plan_doc(doc_path)?;
    let mut plan = doc
        .session
        .plan
        .clone()
        .context("plan document has no plan")?;
    let stack_audit = match doc.audit.clone() {
        Some(a) => a,
        None => {
            let analysis =
                Analyzer::new(vcs.clone()).analyze(&plan.source_ref, &plan.base_ref)?;
            audit(&plan, &analysis)
        }
    };

    let outcome = consolidate(&mut plan, &stack_audit, policy)?;
    if !outcome.changed() {
        println!("Nothing to consolidate");
        return Ok(());
    }
    for merge in &outcome.merges {
        println!("  merged {} into {}", merge.removed, merge.into);
    }
    println!(
        "Re-materialize with `stacksmith materialize` ({} partitions need rebuilding)",
        outcome.revalidate.len()
    );

    doc.session = doc.session.with_plan(plan);
    write_plan_doc(doc_path, &doc)?;
    Ok(())
}

fn cmd_report(doc_path: &std::path::Path) -> Result<()> {
    let doc = read_plan_doc(doc_path)?;
    let report_path = doc_path.with_file_name("stack-summary.md");
    write_report(&report_path, &doc, doc.audit.as_ref())?;
    println!("Report written to {}", report_path.display());
    Ok(())
}

/// Stepwise commands may be re-run at the same stage; only legal
/// forward transitions move the session.
fn advance_if_legal(session: &Session, to: PipelineStage) -> Session {
    session.advance(to).unwrap_or_else(|_| session.clone())
}
