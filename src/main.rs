use blobseq::{BlobEntry, ContainerOptions, Layout, SequenceReader, SequenceWriter, TextEncoding};
use clap::{Parser, Subcommand};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blobseq", about = "Inspect and build blob-sequence containers")]
struct Cli {
    /// Log container activity to stderr (RUST_LOG overrides the level)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack files into a new container, one entry per file
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// sequential, sequential-named, indexed (default), indexed-named
        #[arg(short, long, default_value = "indexed")]
        layout: String,
        /// utf-16le (default), utf-8, ascii
        #[arg(short, long, default_value = "utf-16le")]
        encoding: String,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// List entries
    List {
        input: PathBuf,
        #[arg(short, long, default_value = "indexed")]
        layout: String,
        #[arg(short, long, default_value = "utf-16le")]
        encoding: String,
    },
    /// Write one entry's payload to stdout
    Cat {
        input: PathBuf,
        #[arg(short, long, default_value = "indexed")]
        layout: String,
        #[arg(short, long, default_value = "utf-16le")]
        encoding: String,
        /// Entry position
        #[arg(long, conflicts_with = "name")]
        index: Option<usize>,
        /// Entry name (named layouts)
        #[arg(long)]
        name: Option<String>,
        /// Print as hex instead of raw bytes
        #[arg(long = "hex")]
        as_hex: bool,
    },
    /// Append files to an existing indexed container
    Append {
        target: PathBuf,
        #[arg(short, long, default_value = "indexed")]
        layout: String,
        #[arg(short, long, default_value = "utf-16le")]
        encoding: String,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Show container structure
    Info {
        input: PathBuf,
        #[arg(short, long, default_value = "indexed")]
        layout: String,
        #[arg(short, long, default_value = "utf-16le")]
        encoding: String,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, layout, encoding, input } => {
            let opts = parse_options(&layout, &encoding)?;
            let mut writer = SequenceWriter::new(File::create(&output)?, opts);
            add_files(&mut writer, &input)?;
            writer.flush(true)?;
            println!("Created: {} ({} entries, {})", output.display(), input.len(), opts.layout.name());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, layout, encoding } => {
            let reader = read_all(&input, parse_options(&layout, &encoding)?)?;
            println!("Container: {}", input.display());
            println!("{:>6} {:>12}  {:<26} Preview", "Index", "Size", "Name");
            for (i, entry) in reader.entries().iter().enumerate() {
                println!("{:>6} {:>12}  {:<26} {}",
                    i, entry.data().len(), entry.name().unwrap_or("—"), preview(entry));
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { input, layout, encoding, index, name, as_hex } => {
            let opts = parse_options(&layout, &encoding)?;
            let mut reader = SequenceReader::open(File::open(&input)?, opts)?;
            let entry = match (index, name) {
                (Some(i), None) if opts.layout.is_indexed() => {
                    reader.read_one(i, true)?;
                    reader.get(0)
                }
                (Some(i), None) => {
                    reader.read_all(true)?;
                    reader.get(i)
                }
                (None, Some(n)) => {
                    reader.read_all(true)?;
                    reader.get_named(&n)
                }
                _ => return Err("specify exactly one of --index or --name".into()),
            };
            let entry = entry.ok_or("no such entry")?;
            let mut out = std::io::stdout().lock();
            if as_hex {
                writeln!(out, "{}", hex::encode(entry.data()))?;
            } else {
                out.write_all(entry.data())?;
            }
        }

        // ── Append ───────────────────────────────────────────────────────────
        Commands::Append { target, layout, encoding, input } => {
            let opts = parse_options(&layout, &encoding)?;
            if !opts.layout.is_indexed() {
                return Err(format!("append needs an indexed layout, not {}", opts.layout.name()).into());
            }
            let file = OpenOptions::new().read(true).write(true).open(&target)?;
            let reader = SequenceReader::open(file, opts)?;
            let before = reader.available()?;
            let mut writer = reader.into_appender()?;
            add_files(&mut writer, &input)?;
            writer.flush(false)?;
            let after = writer.directory().map_or(before, |d| d.len());
            writer.close();
            println!("Appended {} entries to {} ({} → {})", input.len(), target.display(), before, after);
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, layout, encoding, json } => {
            let opts = parse_options(&layout, &encoding)?;
            let reader = read_all(&input, opts)?;
            let size = std::fs::metadata(&input)?.len();
            let payload: usize = reader.entries().iter().map(|e| e.data().len()).sum();

            if json {
                let doc = serde_json::json!({
                    "path":      input.display().to_string(),
                    "options":   opts,
                    "size":      size,
                    "entries":   reader.entry_count(),
                    "payload":   payload,
                    "directory": reader.directory(),
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
                return Ok(());
            }

            println!("── Container ────────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Layout         {}", opts.layout.name());
            println!("  Encoding       {}", opts.encoding.name());
            println!("  Size           {} B", size);
            println!("  Entries        {}", reader.entry_count());
            println!("  Payload        {} B", payload);
            if let Some(dir) = reader.directory() {
                println!("  Data start     {}", dir.data_start());
                println!("  Data end       {}", dir.data_end());
                println!("  Directory      {} B", dir.byte_length());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_options(layout: &str, encoding: &str) -> Result<ContainerOptions, Box<dyn std::error::Error>> {
    let layout = Layout::from_name(layout).ok_or_else(|| format!("unknown layout '{layout}'"))?;
    let encoding = TextEncoding::from_name(encoding).ok_or_else(|| format!("unknown encoding '{encoding}'"))?;
    Ok(ContainerOptions::new(layout).with_encoding(encoding))
}

fn read_all(path: &Path, opts: ContainerOptions) -> Result<SequenceReader<File>, Box<dyn std::error::Error>> {
    let mut reader = SequenceReader::open(File::open(path)?, opts)?;
    reader.read_all(true)?;
    Ok(reader)
}

fn add_files<W: Write + std::io::Seek>(
    writer: &mut SequenceWriter<W>,
    paths: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    for path in paths {
        let data = std::fs::read(path)?;
        if writer.layout().is_named() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| format!("{} has no file name", path.display()))?;
            writer.add_named(&name, data)?;
        } else {
            writer.add(data)?;
        }
        println!("  added  {}", path.display());
    }
    Ok(())
}

fn preview(entry: &BlobEntry) -> String {
    let head = &entry.data()[..entry.data().len().min(8)];
    let more = if entry.data().len() > head.len() { "…" } else { "" };
    format!("{}{}", hex::encode(head), more)
}
