use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use leaflet_extractor::{parse_fragments, Extraction, Extractor, ExtractorConfig};

#[derive(Parser)]
#[command(name = "leaflet_extractor", about = "Product extraction from OCR'd retail leaflets")]
struct Cli {
    /// TOML config file (LEAFLET_* env vars override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract products from one OCR fragment file
    Extract {
        file: PathBuf,
        /// Print the product list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show clusters, unmatched fragments and stats for one file
    Inspect { file: PathBuf },
    /// Extract many files in parallel
    Batch {
        files: Vec<PathBuf>,
        /// Worker threads
        #[arg(short = 'j', long, default_value = "4")]
        jobs: usize,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = ExtractorConfig::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
        Commands::Extract { file, json } => {
            let extractor = Extractor::new(cfg)?;
            let out = extract_file(&extractor, &file)?;
            if json {
                let body = serde_json::json!({
                    "products": out.products,
                    "totalProductsExtracted": out.total_products_extracted(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                print_products(&out);
            }
            Ok(())
        }
        Commands::Inspect { file } => {
            let extractor = Extractor::new(cfg)?;
            let out = extract_file(&extractor, &file)?;
            print_inspection(&out);
            Ok(())
        }
        Commands::Batch { files, jobs } => {
            if files.is_empty() {
                println!("No input files.");
                return Ok(());
            }
            let extractor = Extractor::new(cfg)?;
            println!("Extracting {} files...", files.len());
            let counts = process_files(&extractor, &files, jobs)?;
            counts.print();
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn extract_file(extractor: &Extractor, path: &Path) -> anyhow::Result<Extraction> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let fragments = parse_fragments(&json).with_context(|| format!("parsing {}", path.display()))?;
    Ok(extractor.extract(&fragments))
}

fn print_products(out: &Extraction) {
    if out.products.is_empty() {
        println!("No products found.");
        return;
    }

    println!(
        "{:<8} | {:<28} | {:>9} | {:<4} | {:>14} | {:<16} | {:>5}",
        "Id", "Name", "Price", "Cur", "Unit price", "Offer", "Conf"
    );
    println!("{}", "-".repeat(104));

    for p in &out.products {
        let unit_price = match (p.unit_price, &p.unit) {
            (Some(v), Some(u)) => format!("{:.2} {}", v, u),
            _ => "-".into(),
        };
        let offer = p.special_offer.as_deref().unwrap_or("-");
        println!(
            "{:<8} | {:<28} | {:>9.2} | {:<4} | {:>14} | {:<16} | {:>5.3}",
            p.id,
            truncate(&p.name, 28),
            p.price,
            p.currency,
            truncate(&unit_price, 14),
            truncate(offer, 16),
            p.confidence
        );
    }

    println!(
        "\n{} products from {} fragments",
        out.total_products_extracted(),
        out.stats.total_fragments
    );
}

fn print_inspection(out: &Extraction) {
    for (i, c) in out.clusters.iter().enumerate() {
        let status = match &c.product_id {
            Some(id) => id.clone(),
            None => "rejected".into(),
        };
        println!(
            "cluster {:>3} [{}] anchor #{} members {:?}",
            i + 1,
            status,
            c.anchor,
            c.members
        );
        if !c.adjacent_anchors.is_empty() {
            println!("    adjacent anchors {:?}", c.adjacent_anchors);
        }
    }

    if !out.unmatched.is_empty() {
        println!("\n--- Unmatched ---");
        for u in &out.unmatched {
            println!("  #{:<4} {:.2}  {}", u.index, u.confidence, truncate(&u.text, 60));
        }
    }

    let s = &out.stats;
    println!("\nFragments:  {}", s.total_fragments);
    println!("Malformed:  {}", s.malformed_fragments);
    println!("Low conf:   {}", s.low_confidence_fragments);
    println!("Prices:     {}", s.price_candidates);
    println!("Anchors:    {} ({} adjacent pairs)", s.anchors, s.adjacent_anchor_pairs);
    println!("Clustered:  {} ({} absorbed)", s.clustered_fragments, s.absorbed_orphans);
    println!("Orphaned:   {}", s.orphaned_fragments);
    println!("Rejected:   {}", s.rejected_anchors);
    println!("Products:   {}", s.total_products_extracted);
    if let Some(currency) = &out.context_currency {
        println!("Currency:   {}", currency);
    }
}

#[derive(Default)]
struct BatchCounts {
    files: usize,
    failed: usize,
    fragments: usize,
    products: usize,
    orphaned: usize,
}

impl BatchCounts {
    fn print(&self) {
        println!(
            "Extracted {} products from {} files ({} fragments, {} orphaned, {} failed).",
            self.products, self.files, self.fragments, self.orphaned, self.failed,
        );
    }
}

fn process_files(extractor: &Extractor, files: &[PathBuf], jobs: usize) -> anyhow::Result<BatchCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let results: Vec<(&PathBuf, anyhow::Result<Extraction>)> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                let out = extract_file(extractor, path);
                pb.inc(1);
                (path, out)
            })
            .collect()
    });
    pb.finish_and_clear();

    let mut counts = BatchCounts::default();
    for (path, result) in results {
        counts.files += 1;
        match result {
            Ok(out) => {
                let s = &out.stats;
                println!(
                    "{:<40} {:>4} products {:>5} fragments {:>4} orphaned",
                    truncate(&path.display().to_string(), 40),
                    s.total_products_extracted,
                    s.total_fragments,
                    s.orphaned_fragments
                );
                counts.fragments += s.total_fragments;
                counts.products += s.total_products_extracted;
                counts.orphaned += s.orphaned_fragments;
            }
            Err(e) => {
                tracing::warn!("{}: {:#}", path.display(), e);
                counts.failed += 1;
            }
        }
    }
    Ok(counts)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
