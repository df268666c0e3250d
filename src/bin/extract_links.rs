use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use link_archiver::extract_urls;

/// Extract the URLs the archiver would pick up from message text.
#[derive(Parser, Debug)]
#[command(name = "extract-links")]
#[command(
    author,
    version,
    about = "Print the URLs found in message text, one per line"
)]
struct Args {
    /// Files to scan (reads stdin when none are given)
    inputs: Vec<PathBuf>,

    /// Output file path (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep URLs that repeat across lines or files
    #[arg(long)]
    keep_duplicates: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let sources = read_sources(&args.inputs)?;
    let urls = collect_urls(&sources, args.keep_duplicates);

    write_output(&urls, args.output.as_deref())?;

    eprintln!(
        "Scanned {} source(s), extracted {} URL(s)",
        sources.len(),
        urls.len()
    );

    Ok(())
}

fn read_sources(inputs: &[PathBuf]) -> Result<Vec<String>> {
    if inputs.is_empty() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        return Ok(vec![buffer]);
    }

    inputs
        .iter()
        .map(|input| {
            if !input.is_file() {
                anyhow::bail!("Input path does not exist: {}", input.display());
            }
            fs::read_to_string(input)
                .with_context(|| format!("Failed to read file: {}", input.display()))
        })
        .collect()
}

/// Extracts per line, as each line stands for one message.
fn collect_urls(sources: &[String], keep_duplicates: bool) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();

    for line in sources.iter().flat_map(|source| source.lines()) {
        for url in extract_urls(line) {
            if keep_duplicates || seen.insert(url.clone()) {
                urls.push(url);
            }
        }
    }

    urls
}

fn write_output(urls: &[String], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut content = urls.join("\n");
            if !content.is_empty() {
                content.push('\n');
            }
            fs::write(path, content)
                .with_context(|| format!("Failed to write output file: {}", path.display()))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            for url in urls {
                writeln!(stdout, "{url}")?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::collect_urls;

    #[test]
    fn dedups_across_lines_unless_asked() {
        let sources = vec!["a https://a.com/x\nb https://a.com/x.".to_string()];
        assert_eq!(collect_urls(&sources, false), vec!["https://a.com/x"]);
        assert_eq!(collect_urls(&sources, true).len(), 2);
    }

    #[test]
    fn picks_markdown_targets() {
        let sources = vec!["[doc](https://b.com/y)".to_string()];
        assert_eq!(collect_urls(&sources, false), vec!["https://b.com/y"]);
    }
}
