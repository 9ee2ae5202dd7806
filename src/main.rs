use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::PathBuf;
use vark::{AppendOptions, Archive, OpenFlags, DEFAULT_SHARD_SIZE};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "vark")]
#[command(about = "The .vark archive format CLI", long_about = None)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, default_value = "warn")]
    log_level: tracing::Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new archive from files or directories
    Create {
        archive: PathBuf,
        inputs: Vec<PathBuf>,
        /// Store members in independently compressed windows for ranged reads
        #[arg(long)]
        sharded: bool,
        /// Uncompressed window size in bytes
        #[arg(long, default_value_t = DEFAULT_SHARD_SIZE)]
        shard_size: u32,
    },
    /// Append files to an archive, creating it if absent
    Append {
        archive: PathBuf,
        inputs: Vec<PathBuf>,
        #[arg(long)]
        sharded: bool,
        #[arg(long, default_value_t = DEFAULT_SHARD_SIZE)]
        shard_size: u32,
    },
    /// Extract every member into a directory
    Extract {
        archive: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// List archive contents
    List { archive: PathBuf },
    /// Decompress every member and check its stored content hash
    Verify { archive: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    match &cli.command {
        Commands::Create { archive, inputs, sharded, shard_size } => {
            let files = collect_inputs(inputs)?;
            if files.is_empty() {
                return Err("no input files specified".into());
            }
            println!("Creating archive: {}", archive.display());
            let mut ar = Archive::create(archive, OpenFlags::writing().persistent())?;
            let opts = append_options(*sharded, *shard_size);
            for file in &files {
                println!("  Adding: {}", file.display());
                ar.append(file, opts)?;
            }
            ar.close();
        }
        Commands::Append { archive, inputs, sharded, shard_size } => {
            let files = collect_inputs(inputs)?;
            if files.is_empty() {
                return Err("no input files specified".into());
            }
            let mut ar = if archive.exists() {
                Archive::load(archive, OpenFlags::writing().persistent())?
            } else {
                println!("Archive not found, creating new: {}", archive.display());
                Archive::create(archive, OpenFlags::writing().persistent())?
            };
            let opts = append_options(*sharded, *shard_size);
            for file in &files {
                println!("  Appending: {}", file.display());
                ar.append(file, opts)?;
            }
            ar.close();
        }
        Commands::Extract { archive, output_dir } => {
            println!("Extracting archive: {}", archive.display());
            let mut ar = Archive::load(archive, OpenFlags::mapped())?;
            let names: Vec<String> = ar.entries().iter().map(|e| e.path.clone()).collect();
            for name in names {
                println!("  Extracting: {name}");
                let data = ar.decompress(&name)?;
                let out_path = output_dir.join(&name);
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&out_path, &data)?;
            }
        }
        Commands::List { archive } => {
            let ar = Archive::load(archive, OpenFlags::reading())?;
            println!(
                "Archive: {} ({} bytes, {} files)",
                archive.display(),
                ar.archive_size(),
                ar.len()
            );
            println!("  {:>15}  {:>12}  Path", "Compressed", "Window");
            for entry in ar.entries() {
                let window = if entry.shard_size == 0 {
                    "whole".to_string()
                } else {
                    entry.shard_size.to_string()
                };
                println!("  {:>15}  {:>12}  {}", entry.size, window, entry.path);
            }
        }
        Commands::Verify { archive } => {
            println!("Verifying archive: {}", archive.display());
            let mut ar = Archive::load(archive, OpenFlags::mapped())?;
            let names: Vec<String> = ar.entries().iter().map(|e| e.path.clone()).collect();
            let mut failures = 0u32;
            for name in names {
                print!("  {name}... ");
                // decompress re-hashes the output, so a stored-hash mismatch
                // comes back as a Corrupt error.
                match ar.decompress(&name) {
                    Ok(_) => println!("OK"),
                    Err(err) => {
                        println!("FAILED ({err})");
                        failures += 1;
                    }
                }
            }
            if failures == 0 {
                println!("\nIntegrity check PASSED.");
            } else {
                println!("\nIntegrity check FAILED ({failures} errors found).");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn append_options(sharded: bool, shard_size: u32) -> AppendOptions {
    if sharded {
        AppendOptions::sharded().shard_size(shard_size)
    } else {
        AppendOptions::whole()
    }
}

/// Expand the argument list: directories are walked recursively, regular
/// files pass through.
fn collect_inputs(inputs: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else if input.is_file() {
            files.push(input.clone());
        }
    }
    Ok(files)
}
