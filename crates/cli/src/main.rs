use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use config::EngineConfig;
use lumina_catalog::{
    BoundingBox, Catalog, EmbeddingStore, FaceDetection, JobStatus, Person, RegenerationJob,
    VectorKind,
};
use lumina_people::{ClusterPass, ClusterQualityReport, ClusterQualityValidator, FaceClusterer};
use lumina_regen::{stub_vector, JobLedger, RegenError, RegenerationPipeline, StubProvider};
use lumina_search::{MergedHit, QueryFusionEngine, ScoredEntity, SemanticSearch, Signal};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;

const CATALOG_FILE: &str = "catalog.json";
const JOB_FILE: &str = "job.json";

/// Offset scale for seeded face vectors. Faces of one identity share a base
/// vector plus this much per-face offset, which puts same-identity pairs
/// near 0.89 cosine similarity and cross-identity pairs near zero.
const IDENTITY_SPREAD: f32 = 0.35;

#[derive(Parser)]
#[command(name = "lumina")]
#[command(about = "Photo library intelligence engine", long_about = None)]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Directory holding the catalog snapshot and the job ledger
    #[arg(long, global = true, default_value = ".lumina")]
    data_dir: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Populate the catalog with deterministic demo vectors
    Seed(SeedArgs),

    /// Search the library with fused keyword and semantic ranking
    Search(SearchArgs),

    /// Group face vectors into persons
    Cluster(ClusterArgs),

    /// Check person groupings for coherence problems
    Validate(ValidateArgs),

    /// Start or resume a vector regeneration job
    Regen(RegenArgs),

    /// Show the catalog contents and the persisted regeneration job
    Status(StatusArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Face,
    Semantic,
}

impl KindArg {
    const fn to_kind(self) -> VectorKind {
        match self {
            Self::Face => VectorKind::Face,
            Self::Semantic => VectorKind::Semantic,
        }
    }
}

#[derive(Args)]
struct SeedArgs {
    /// Number of photos to give semantic vectors
    #[arg(long, default_value_t = 24)]
    photos: usize,

    /// Number of faces to give face vectors and detection records
    #[arg(long, default_value_t = 12)]
    faces: usize,

    /// Number of synthetic identities the faces are drawn from
    #[arg(long, default_value_t = 3)]
    identities: usize,

    /// Vector version to seed at
    #[arg(long, default_value_t = 1)]
    version: u32,

    /// Output machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// Entity whose stored semantic vector is the query (query by example)
    #[arg(long, value_name = "ENTITY_ID")]
    like: u64,

    /// Keyword-signal hit as `entity_id=score`, repeatable
    #[arg(long, value_name = "ID=SCORE", value_parser = parse_scored_entity)]
    keyword: Vec<ScoredEntity>,

    /// Maximum number of results
    #[arg(long, short = 'n', default_value_t = 10)]
    limit: usize,

    /// Drop semantic matches below this similarity
    #[arg(long, default_value_t = 0.0)]
    min_similarity: f32,

    /// Vector version to search (defaults to the newest stored version)
    #[arg(long)]
    version: Option<u32>,

    /// Output machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ClusterArgs {
    /// Vector version to cluster (defaults to the newest stored version)
    #[arg(long)]
    version: Option<u32>,

    /// Minimum cosine similarity for two faces to count as neighbors
    #[arg(long)]
    threshold: Option<f32>,

    /// Neighborhood size, self included, required for a core point
    #[arg(long)]
    min_points: Option<usize>,

    /// Output machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ValidateArgs {
    /// Vector version to validate against (defaults to the newest stored version)
    #[arg(long)]
    version: Option<u32>,

    /// Flag persons whose mean internal similarity falls below this floor
    #[arg(long)]
    intra_floor: Option<f32>,

    /// Flag person pairs whose cross similarity exceeds this ceiling
    #[arg(long)]
    inter_ceiling: Option<f32>,

    /// Output machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RegenArgs {
    /// Vector kind to regenerate (required unless --resume)
    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    /// Version every vector is brought up to (defaults to current + 1)
    #[arg(long)]
    target_version: Option<u32>,

    /// Entities fetched and written per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Continue the persisted job instead of starting a new one
    #[arg(long)]
    resume: bool,

    /// Output machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatusArgs {
    /// Output machine-readable JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let json_output = match &cli.command {
        Commands::Seed(args) => args.json,
        Commands::Search(args) => args.json,
        Commands::Cluster(args) => args.json,
        Commands::Validate(args) => args.json,
        Commands::Regen(args) => args.json,
        Commands::Status(args) => args.json,
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet || json_output {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Seed(args) => run_seed(args, &cli.data_dir).await?,
        Commands::Search(args) => run_search(args, config, &cli.data_dir).await?,
        Commands::Cluster(args) => run_cluster(args, config, &cli.data_dir).await?,
        Commands::Validate(args) => run_validate(args, config, &cli.data_dir).await?,
        Commands::Regen(args) => run_regen(args, config, &cli.data_dir).await?,
        Commands::Status(args) => run_status(args, &cli.data_dir).await?,
    }

    Ok(())
}

async fn load_catalog(data_dir: &Path) -> Catalog {
    Catalog::load_or_default(&data_dir.join(CATALOG_FILE)).await
}

async fn save_catalog(catalog: &Catalog, data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    catalog.save_to(&data_dir.join(CATALOG_FILE)).await?;
    Ok(())
}

/// The version a command operates on when `--version` is not given: the
/// newest version stored for `kind`.
fn resolve_version(catalog: &Catalog, kind: VectorKind, requested: Option<u32>) -> Result<u32> {
    requested
        .or_else(|| catalog.vectors().current_version(kind))
        .with_context(|| {
            format!(
                "no {} vectors in the catalog; run `lumina seed` first",
                kind.as_str()
            )
        })
}

fn parse_scored_entity(raw: &str) -> Result<ScoredEntity, String> {
    let (id, score) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `entity_id=score`, got `{raw}`"))?;
    let entity_id: u64 = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid entity id `{id}`"))?;
    let parsed: f32 = score
        .trim()
        .parse()
        .map_err(|_| format!("invalid score `{score}`"))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(format!("score must be within [0, 1], got {parsed}"));
    }
    Ok(ScoredEntity::new(entity_id, parsed))
}

/// Face vector for seeding. With identities, each face is its identity's
/// base vector plus a per-face offset; without, a plain stub vector.
fn seeded_face_vector(face_id: u64, identities: usize, version: u32) -> Vec<f32> {
    if identities == 0 {
        return stub_vector(face_id, VectorKind::Face, version);
    }
    let identity = (face_id - 1) % identities as u64 + 1;
    let base = stub_vector(identity, VectorKind::Face, version);
    let offset = stub_vector(u64::MAX - face_id, VectorKind::Face, version);
    base.iter()
        .zip(&offset)
        .map(|(b, o)| b + IDENTITY_SPREAD * o)
        .collect()
}

#[derive(Serialize)]
struct SeedResponse {
    version: u32,
    photos: usize,
    faces: usize,
    identities: usize,
}

async fn run_seed(args: SeedArgs, data_dir: &Path) -> Result<()> {
    let catalog = load_catalog(data_dir).await;

    for photo_id in 1..=args.photos as u64 {
        let vector = stub_vector(photo_id, VectorKind::Semantic, args.version);
        catalog
            .vectors()
            .put(photo_id, VectorKind::Semantic, vector, args.version)?;
    }

    for face_id in 1..=args.faces as u64 {
        let vector = seeded_face_vector(face_id, args.identities, args.version);
        catalog
            .vectors()
            .put(face_id, VectorKind::Face, vector, args.version)?;

        let slot = (face_id % 3) as f32;
        catalog.people().upsert_face(FaceDetection {
            id: face_id,
            photo_id: (face_id - 1) % args.photos.max(1) as u64 + 1,
            bounding_box: BoundingBox {
                x: 0.1 + 0.25 * slot,
                y: 0.15,
                width: 0.2,
                height: 0.25,
            },
            confidence: 0.95,
            person_id: None,
            vector_version: args.version,
        });
    }

    save_catalog(&catalog, data_dir).await?;
    log::info!(
        "Seeded {} semantic and {} face vectors at version {}",
        args.photos,
        args.faces,
        args.version
    );

    let response = SeedResponse {
        version: args.version,
        photos: args.photos,
        faces: args.faces,
        identities: args.identities,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!(
            "Seeded {} semantic vectors and {} face vectors ({} identities) at version {}",
            args.photos, args.faces, args.identities, args.version
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct SearchResponse {
    version: u32,
    query_entity: u64,
    results: Vec<MergedHit>,
}

fn sources_label(sources: &BTreeSet<Signal>) -> String {
    sources
        .iter()
        .map(|signal| match signal {
            Signal::Keyword => "keyword",
            Signal::Semantic => "semantic",
        })
        .collect::<Vec<_>>()
        .join("+")
}

async fn run_search(args: SearchArgs, config: EngineConfig, data_dir: &Path) -> Result<()> {
    let catalog = load_catalog(data_dir).await;
    let version = resolve_version(&catalog, VectorKind::Semantic, args.version)?;

    let query = catalog
        .vectors()
        .get(args.like, VectorKind::Semantic)
        .with_context(|| format!("No semantic vector stored for entity {}", args.like))?;

    let search = SemanticSearch::from_snapshot(catalog.vectors(), VectorKind::Semantic, version)?;
    let semantic = search.search(&query, args.limit, args.min_similarity)?;

    let engine = QueryFusionEngine::new(config.fusion)?;
    let mut results = engine.merge(&args.keyword, &semantic);
    results.truncate(args.limit);

    if args.json {
        let response = SearchResponse {
            version,
            query_entity: args.like,
            results,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if results.is_empty() {
        println!("No matches for entity {} at version {version}", args.like);
    } else {
        println!("Results for entity {} at version {version}:", args.like);
        for (rank, hit) in results.iter().enumerate() {
            println!(
                "{:>3}. entity {:<8} score {:.3}  [{}]",
                rank + 1,
                hit.entity_id,
                hit.score,
                sources_label(&hit.sources)
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ClusterResponse {
    version: u32,
    pass: ClusterPass,
    persons: Vec<Person>,
}

async fn run_cluster(args: ClusterArgs, config: EngineConfig, data_dir: &Path) -> Result<()> {
    let catalog = load_catalog(data_dir).await;
    let version = resolve_version(&catalog, VectorKind::Face, args.version)?;

    let mut params = config.clustering;
    if let Some(threshold) = args.threshold {
        params.similarity_threshold = threshold;
    }
    if let Some(min_points) = args.min_points {
        params.min_points = min_points;
    }

    let pass = FaceClusterer::new(params)?.run(&catalog, version)?;
    save_catalog(&catalog, data_dir).await?;

    let persons = catalog.people().persons();
    if args.json {
        let response = ClusterResponse {
            version,
            pass,
            persons,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!(
            "Clustered {} faces at version {version}: {} persons, {} noise",
            pass.total_faces, pass.clusters, pass.noise_faces
        );
        for person in &persons {
            println!("  {} ({} faces)", person.label, person.face_count());
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ValidateResponse {
    version: u32,
    report: ClusterQualityReport,
}

async fn run_validate(args: ValidateArgs, config: EngineConfig, data_dir: &Path) -> Result<()> {
    let catalog = load_catalog(data_dir).await;
    let version = resolve_version(&catalog, VectorKind::Face, args.version)?;

    let mut thresholds = config.quality;
    if let Some(floor) = args.intra_floor {
        thresholds.intra_floor = floor;
    }
    if let Some(ceiling) = args.inter_ceiling {
        thresholds.inter_ceiling = ceiling;
    }

    let report = ClusterQualityValidator::new(thresholds)?.validate(&catalog, version)?;

    if args.json {
        let response = ValidateResponse { version, report };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if report.is_clean() {
        println!(
            "Checked {} persons and {} pairs at version {version}: no problems found",
            report.persons_checked, report.pairs_checked
        );
    } else {
        println!(
            "Checked {} persons and {} pairs at version {version}: {} low-confidence, {} ambiguous",
            report.persons_checked,
            report.pairs_checked,
            report.low_confidence.len(),
            report.ambiguous.len()
        );
        for person in &report.low_confidence {
            println!(
                "  low confidence: {} (id {}) intra similarity {:.3} across {} faces",
                person.label, person.person_id, person.intra_similarity, person.face_count
            );
        }
        for pair in &report.ambiguous {
            println!(
                "  ambiguous: persons {} and {} inter similarity {:.3}",
                pair.person_a, pair.person_b, pair.inter_similarity
            );
        }
    }
    Ok(())
}

async fn run_regen(args: RegenArgs, config: EngineConfig, data_dir: &Path) -> Result<()> {
    let catalog_path = data_dir.join(CATALOG_FILE);
    let catalog = Arc::new(Catalog::load_or_default(&catalog_path).await);
    let ledger = JobLedger::new(data_dir.join(JOB_FILE));

    let (kind, target_version) = if args.resume {
        match ledger.load().await {
            Some(job) => (job.kind, job.target_version),
            None => {
                eprintln!("Error: no regeneration job recorded; start one with --kind");
                std::process::exit(1);
            }
        }
    } else {
        let Some(kind) = args.kind else {
            eprintln!("Error: --kind is required to start a job");
            std::process::exit(1);
        };
        let kind = kind.to_kind();
        let target = match args.target_version {
            Some(version) => version,
            None => match catalog.vectors().current_version(kind) {
                Some(current) => current + 1,
                None => {
                    eprintln!(
                        "Error: no {} vectors in the catalog; run `lumina seed` first",
                        kind.as_str()
                    );
                    std::process::exit(1);
                }
            },
        };
        (kind, target)
    };

    let mut regen_config = config.regen;
    if let Some(batch_size) = args.batch_size {
        regen_config.batch_size = batch_size;
    }

    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let provider = Arc::new(StubProvider::new(target_version));
    let pipeline = Arc::new(
        RegenerationPipeline::new(catalog, provider, ledger, regen_config)?
            .with_catalog_snapshot(catalog_path),
    );

    let mut events = pipeline.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log::info!(
                "Job {}: {}/{} entities processed, {} failed",
                event.job_id,
                event.processed,
                event.total,
                event.failed
            );
        }
    });

    let interrupt = Arc::clone(&pipeline);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted: pausing at the next batch boundary");
            interrupt.pause();
        }
    });

    let result = if args.resume {
        pipeline.resume().await
    } else {
        pipeline.start(kind, target_version).await
    };
    let job = match result {
        Ok(job) => job,
        Err(RegenError::JobAlreadyRunning(id)) => {
            eprintln!("Error: job {id} is already running");
            std::process::exit(1);
        }
        Err(RegenError::StaleJob { job_id, age_ms }) => {
            eprintln!(
                "Error: job {job_id} went stale ({age_ms} ms since its last heartbeat) \
                 and was marked failed; start a new job"
            );
            std::process::exit(1);
        }
        Err(RegenError::NoResumableJob) => {
            eprintln!("Error: the recorded job already finished; start a new one with --kind");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }
    match job.status {
        JobStatus::Completed => println!(
            "Job {} completed: {}/{} {} vectors at version {} ({} failed)",
            job.id,
            job.processed,
            job.total,
            job.kind.as_str(),
            job.target_version,
            job.failed
        ),
        JobStatus::Paused => println!(
            "Job {} paused at {}/{}; run `lumina regen --resume` to continue",
            job.id, job.processed, job.total
        ),
        JobStatus::Cancelled => println!(
            "Job {} cancelled at {}/{}",
            job.id, job.processed, job.total
        ),
        _ => {}
    }
    Ok(())
}

#[derive(Serialize)]
struct CatalogSummary {
    semantic_vectors: usize,
    semantic_version: Option<u32>,
    face_vectors: usize,
    face_version: Option<u32>,
    faces: usize,
    persons: usize,
}

#[derive(Serialize)]
struct StatusResponse {
    catalog: CatalogSummary,
    job: Option<RegenerationJob>,
}

const fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Paused => "paused",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn version_label(version: Option<u32>) -> String {
    version.map_or_else(|| "-".to_string(), |v| format!("v{v}"))
}

async fn run_status(args: StatusArgs, data_dir: &Path) -> Result<()> {
    let catalog = load_catalog(data_dir).await;
    let job = JobLedger::new(data_dir.join(JOB_FILE)).load().await;

    let vectors = catalog.vectors();
    let summary = CatalogSummary {
        semantic_vectors: vectors.count(VectorKind::Semantic),
        semantic_version: vectors.current_version(VectorKind::Semantic),
        face_vectors: vectors.count(VectorKind::Face),
        face_version: vectors.current_version(VectorKind::Face),
        faces: catalog.people().face_count(),
        persons: catalog.people().person_count(),
    };

    if args.json {
        let response = StatusResponse {
            catalog: summary,
            job,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!(
        "Catalog: {} semantic vectors ({}), {} face vectors ({}), {} faces, {} persons",
        summary.semantic_vectors,
        version_label(summary.semantic_version),
        summary.face_vectors,
        version_label(summary.face_version),
        summary.faces,
        summary.persons
    );
    match job {
        Some(job) => println!(
            "Job {} ({} -> v{}): {}, {}/{} processed ({:.1}%), {} failed",
            job.id,
            job.kind.as_str(),
            job.target_version,
            status_label(job.status),
            job.processed,
            job.total,
            job.percent_complete(),
            job.failed
        ),
        None => println!("No regeneration job recorded"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (norm_a * norm_b)
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn keyword_hits_parse_from_id_equals_score() {
        let hit = parse_scored_entity("42=0.75").unwrap();
        assert_eq!(hit.entity_id, 42);
        assert!((hit.score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn malformed_keyword_hits_are_rejected() {
        assert!(parse_scored_entity("42").is_err());
        assert!(parse_scored_entity("x=0.5").is_err());
        assert!(parse_scored_entity("42=high").is_err());
        assert!(parse_scored_entity("42=1.5").is_err());
    }

    #[test]
    fn seeded_identities_separate_under_cosine() {
        // Faces 1 and 4 share identity 1 of 3; face 2 belongs to identity 2.
        let a1 = seeded_face_vector(1, 3, 1);
        let a2 = seeded_face_vector(4, 3, 1);
        let b1 = seeded_face_vector(2, 3, 1);

        assert!(cosine(&a1, &a2) > 0.6);
        assert!(cosine(&a1, &b1) < 0.4);
    }

    #[test]
    fn seeding_without_identities_uses_plain_stubs() {
        assert_eq!(
            seeded_face_vector(7, 0, 2),
            stub_vector(7, VectorKind::Face, 2)
        );
    }
}
