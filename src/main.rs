mod cli;

use anyhow::{Context, Result};
use binsniff::{default_store_path, AnalysisOptions, AnalysisResult, SignatureStore, Sniffer};
use clap::Parser;
use cli::{Args, Command, SignaturesCommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with_writer(std::io::stderr)
        .init();

    let store_path = args.store.clone().unwrap_or_else(default_store_path);

    match args.command {
        Command::Analyze {
            path,
            threshold,
            no_fuzzy,
            fuzzy_threshold,
            min_matches,
            hashes,
            fuzzy_hashes,
            max_size,
            timeout,
            top,
            patterns,
            workers,
            no_context_filter,
        } => {
            let options = AnalysisOptions {
                threshold,
                fuzzy: !no_fuzzy,
                fuzzy_threshold,
                min_matches,
                include_hashes: hashes,
                include_fuzzy_hashes: fuzzy_hashes,
                size_ceiling: max_size,
                timeout: Duration::from_secs(timeout),
                top_matches: top,
                include_patterns: patterns,
                workers,
                filter_by_context: !no_context_filter,
                ..Default::default()
            };
            run_analyze(&store_path, &path, &options, args.json)
        }
        Command::Signatures(cmd) => run_signatures(&store_path, cmd, args.json),
    }
}

fn run_analyze(store: &Path, path: &Path, options: &AnalysisOptions, json: bool) -> Result<()> {
    let sniffer = Sniffer::open(store).with_context(|| {
        format!(
            "cannot open signature store {} (import signatures first?)",
            store.display()
        )
    })?;

    let results = if path.is_dir() {
        sniffer.analyze_directory(path, options)?
    } else {
        vec![sniffer.analyze(path, options)?]
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            print_result(result);
        }
    }
    Ok(())
}

fn print_result(result: &AnalysisResult) {
    println!(
        "{} [{}] {} features, {} ms",
        result.file_path.bold(),
        result.file_type,
        result.features_extracted,
        result.analysis_time_ms
    );
    if let Some(error) = &result.error {
        println!("  {} {:?}: {}", "error".red(), error.kind, error.message);
        return;
    }
    if result.matches.is_empty() {
        println!("  {}", "no components detected".dimmed());
        return;
    }
    for m in &result.matches {
        let confidence = format!("{:5.1}%", m.confidence * 100.0);
        println!(
            "  {} {} {} {} ({}, {} patterns{})",
            confidence.green(),
            m.component.bold(),
            m.license.as_deref().unwrap_or("-"),
            m.ecosystem.as_str(),
            m.match_method.as_str(),
            m.evidence.pattern_count,
            m.evidence
                .fuzzy_distance
                .map(|d| format!(", distance {d}"))
                .unwrap_or_default(),
        );
        for source in m.evidence.source_files.iter().take(3) {
            println!("         {} {}", "from".dimmed(), source);
        }
    }
}

fn run_signatures(store_path: &Path, cmd: SignaturesCommand, json: bool) -> Result<()> {
    match cmd {
        SignaturesCommand::Import { paths } => {
            let mut store = SignatureStore::open(store_path)?;
            let files = expand_signature_paths(&paths)?;
            anyhow::ensure!(!files.is_empty(), "no signature files found");

            let mut imported = 0usize;
            let mut unchanged = 0usize;
            let mut failed = 0usize;
            for file in files {
                match binsniff::sigfile::load_signature_file(&file)
                    .and_then(|loaded| store.import(&loaded))
                {
                    Ok(summary) if summary.unchanged => unchanged += 1,
                    Ok(summary) => {
                        imported += 1;
                        eprintln!(
                            "  {} {} ({} patterns, {} rejected)",
                            "imported".green(),
                            summary.component,
                            summary.accepted,
                            summary.rejected
                        );
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("  {} {}: {e}", "skipped".yellow(), file.display());
                    }
                }
            }
            println!("{imported} imported, {unchanged} unchanged, {failed} skipped");
            Ok(())
        }
        SignaturesCommand::Status => {
            let store = SignatureStore::open(store_path)?;
            let status = store.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("store:       {}", status.path);
                println!("components:  {}", status.components);
                println!("patterns:    {}", status.patterns);
                println!("lsh digests: {}", status.lsh_digests);
                println!(
                    "last import: {}",
                    status.last_import.as_deref().unwrap_or("never")
                );
            }
            Ok(())
        }
        SignaturesCommand::Reindex => {
            let mut store = SignatureStore::open(store_path)?;
            store.rebuild_indices()?;
            println!("indices rebuilt");
            Ok(())
        }
    }
}

fn expand_signature_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in walkdir::WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "json")
                {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    Ok(files)
}
