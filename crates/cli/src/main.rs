use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{ArgAction, Parser, Subcommand};
use folio_core::model::serialize::to_bytes;
use folio_core::parser::SourceEntry;
use folio_core::{Document, Node, ObjectId, ReaderConfig, WriterConfig, XrefForm};
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Inspect and rewrite PDF object graphs")]
#[command(version)]
struct Cli {
    /// Log flush and recovery details (overridden by RUST_LOG)
    #[arg(short = 'v', long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,

    /// Fail on damaged cross-reference data instead of scanning
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the trailer and objects of a file
    Dump {
        file: PathBuf,

        /// Object numbers to print, e.g. `--object 3,7`; all objects when omitted
        #[arg(short = 'i', long = "object", value_delimiter = ',')]
        objects: Vec<u32>,

        /// Print decoded stream data instead of the raw payload
        #[arg(long, action = ArgAction::SetTrue)]
        decode: bool,

        /// Path to file where output is written, or "-" for stdout
        #[arg(short = 'o', long, default_value = "-")]
        outfile: String,
    },
    /// Write a copy of a file, optionally as an incremental update
    Rewrite {
        input: PathBuf,
        output: PathBuf,

        /// Deflate level for written streams, -1 for the default
        #[arg(short = 'c', long, default_value_t = -1, allow_negative_numbers = true)]
        compression: i32,

        /// Pack eligible objects into object streams
        #[arg(long, action = ArgAction::SetTrue)]
        object_streams: bool,

        /// Write a cross-reference stream instead of a table
        #[arg(long, action = ArgAction::SetTrue)]
        xref_stream: bool,

        /// Append changed objects to the original bytes
        #[arg(long, action = ArgAction::SetTrue)]
        incremental: bool,
    },
}

fn map_file(path: &Path) -> Result<Bytes> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file) }?;
    Ok(Bytes::from_owner(mmap))
}

fn dump_object<W: Write>(
    out: &mut W,
    doc: &mut Document,
    id: ObjectId,
    decode: bool,
) -> Result<()> {
    let node = doc.fetch(id)?.clone();
    writeln!(out, "{} {} obj", id.number, id.generation)?;
    match &node {
        Node::Stream(stream) => {
            out.write_all(&to_bytes(&Node::Dictionary(stream.dict.clone()))?)?;
            writeln!(out)?;
            let data = if decode {
                doc.decode_stream(id)?
            } else {
                stream.raw().to_vec()
            };
            writeln!(out, "stream ({} bytes)", data.len())?;
            out.write_all(&data)?;
            writeln!(out, "\nendstream")?;
        }
        other => {
            out.write_all(&to_bytes(other)?)?;
            writeln!(out)?;
        }
    }
    writeln!(out, "endobj")?;
    Ok(())
}

fn dump<W: Write>(out: &mut W, doc: &mut Document, objects: &[u32], decode: bool) -> Result<()> {
    if doc.is_recovered() {
        writeln!(out, "% cross-reference data rebuilt by scanning")?;
    }
    writeln!(out, "trailer")?;
    out.write_all(&to_bytes(&Node::Dictionary(doc.trailer().clone()))?)?;
    writeln!(out)?;

    let source = doc.registry().source().context("document has no source")?;
    let ids: Vec<ObjectId> = source
        .entries()
        .iter()
        .filter(|&(&number, _)| number != 0 && (objects.is_empty() || objects.contains(&number)))
        .filter_map(|(&number, entry)| match entry {
            SourceEntry::Free { .. } => None,
            live => Some(ObjectId::new(number, live.generation())),
        })
        .collect();
    for number in objects {
        if !ids.iter().any(|id| id.number == *number) {
            bail!("object {number} is not in the file");
        }
    }

    for id in ids {
        dump_object(out, doc, id, decode)?;
    }
    Ok(())
}

fn rewrite(
    input: &Path,
    output: &Path,
    reader: ReaderConfig,
    config: WriterConfig,
) -> Result<()> {
    let data = map_file(input)?;
    let sink = BufWriter::new(
        File::create(output).with_context(|| format!("cannot create {}", output.display()))?,
    );
    let doc = Document::open_for_update(data, sink, reader, config)?;
    let mut sink = doc.finish()?;
    sink.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();

    let reader = ReaderConfig::default().with_strict(cli.strict);
    match cli.command {
        Command::Dump {
            file,
            objects,
            decode,
            outfile,
        } => {
            let mut doc = Document::open_with(map_file(&file)?, reader)?;
            let mut out: Box<dyn Write> = if outfile == "-" {
                Box::new(BufWriter::new(io::stdout()))
            } else {
                Box::new(BufWriter::new(File::create(&outfile)?))
            };
            dump(&mut out, &mut doc, &objects, decode)?;
            out.flush()?;
        }
        Command::Rewrite {
            input,
            output,
            compression,
            object_streams,
            xref_stream,
            incremental,
        } => {
            let form = if xref_stream {
                XrefForm::Stream
            } else {
                XrefForm::Table
            };
            let config = WriterConfig::default()
                .with_compression_level(compression)
                .with_object_streams(object_streams)
                .with_xref_form(form)
                .with_incremental(incremental);
            rewrite(&input, &output, reader, config)?;
            info!(output = %output.display(), "rewrite finished");
        }
    }
    Ok(())
}
