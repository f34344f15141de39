//! golf-coach-cli — command-line client for the Golf Coach API
//!
//! Does the client-side work of the web frontend: checks and compresses swing
//! photos before upload, then talks to the REST API.
//!
//! # Subcommands
//! - `analyze --address F --top F --impact F --follow-through F` — upload and analyze
//! - `history [--limit N] [--offset N] [--sort newest|oldest|rating]`
//! - `show <id> [--save-images DIR]`
//! - `compare <id> <id>`
//! - `delete <id>`
//! - `status`                                 — show server health

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use golf_coach_core::images::{
    compress_to_limit, decode_base64, sniff_media_type, MEDIA_TYPE_JPEG, MEDIA_TYPE_PNG,
};
use golf_coach_core::models::{SwingHistoryItem, SwingPosition, SwingRecord};
use reqwest::blocking::{multipart, Client, RequestBuilder};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_LIMIT: u32 = 50;
/// Photos above this size are recompressed before upload.
const UPLOAD_LIMIT_BYTES: usize = 2 * 1024 * 1024;
const UPLOAD_MAX_DIMENSION: u32 = 1920;
/// The server may retry the vision call several times.
const ANALYZE_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "golf-coach-cli",
    version,
    about = "Golf Coach — upload swing photos, browse history and compare analyses"
)]
struct Cli {
    /// Golf Coach server URL (overrides GOLF_COACH_URL env var)
    #[arg(long, env = "GOLF_COACH_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload swing photos and print the coaching analysis
    Analyze {
        #[arg(long)]
        address: Option<PathBuf>,
        #[arg(long)]
        top: Option<PathBuf>,
        #[arg(long)]
        impact: Option<PathBuf>,
        #[arg(long)]
        follow_through: Option<PathBuf>,

        /// Club used, e.g. "7-iron"
        #[arg(long)]
        club: Option<String>,
        /// What happened to the ball, e.g. "slice"
        #[arg(long)]
        shot_outcome: Option<String>,
        /// What you are working on
        #[arg(long)]
        focus_area: Option<String>,
        #[arg(long)]
        notes: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List previous analyses
    History {
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, value_enum, default_value_t = HistorySort::Newest)]
        sort: HistorySort,
        #[arg(long)]
        json: bool,
    },

    /// Show one analysis in full
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
        /// Write the stored photos into this directory
        #[arg(long)]
        save_images: Option<PathBuf>,
    },

    /// Compare two analyses side by side
    Compare { first: i64, second: i64 },

    /// Delete an analysis
    Delete { id: i64 },

    /// Show Golf Coach server status
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HistorySort {
    Newest,
    Oldest,
    Rating,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyzeResponse {
    pub swing_id: i64,
    pub analysis: String,
    pub rating: Option<i64>,
    pub summary: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    pub total: i64,
    pub swings: Vec<SwingHistoryItem>,
}

// ============================================================================
// Image intake
// ============================================================================

/// A photo ready for upload.
#[derive(Debug)]
pub struct PreparedImage {
    pub position: SwingPosition,
    pub file_name: String,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Read a photo, reject anything that is not JPEG or PNG, and shrink it
/// when it exceeds the upload limit.
pub fn prepare_image(position: SwingPosition, path: &Path) -> anyhow::Result<PreparedImage> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let media_type = match sniff_media_type(&bytes) {
        Some(m) => m,
        None => bail!("{} is not a JPEG or PNG image", path.display()),
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.jpg", position));

    if bytes.len() <= UPLOAD_LIMIT_BYTES {
        return Ok(PreparedImage {
            position,
            file_name,
            media_type,
            bytes,
        });
    }

    let original = bytes.len();
    let compressed = compress_to_limit(&bytes, UPLOAD_LIMIT_BYTES, UPLOAD_MAX_DIMENSION)
        .with_context(|| format!("cannot compress {}", path.display()))?;
    eprintln!(
        "Compressed {} from {:.1}MB to {:.1}MB",
        path.display(),
        megabytes(original),
        megabytes(compressed.len())
    );

    Ok(PreparedImage {
        position,
        file_name: with_extension(&file_name, "jpg"),
        media_type: sniff_media_type(&compressed).unwrap_or(MEDIA_TYPE_JPEG),
        bytes: compressed,
    })
}

fn megabytes(n: usize) -> f64 {
    n as f64 / (1024.0 * 1024.0)
}

fn with_extension(file_name: &str, ext: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) => format!("{}.{}", stem, ext),
        None => format!("{}.{}", file_name, ext),
    }
}

/// `swing-12-top.png`
pub fn export_file_name(id: i64, position: SwingPosition, bytes: &[u8]) -> String {
    let ext = match sniff_media_type(bytes) {
        Some(m) if m == MEDIA_TYPE_PNG => "png",
        _ => "jpg",
    };
    format!("swing-{}-{}.{}", id, position, ext)
}

// ============================================================================
// Formatting helpers
// ============================================================================

pub fn sort_history(items: &mut [SwingHistoryItem], sort: HistorySort) {
    match sort {
        HistorySort::Newest => items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
        HistorySort::Oldest => items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))),
        // Unrated swings go last.
        HistorySort::Rating => items.sort_by(|a, b| {
            b.rating
                .unwrap_or(0)
                .cmp(&a.rating.unwrap_or(0))
                .then(b.created_at.cmp(&a.created_at))
        }),
    }
}

pub fn format_rating(rating: Option<i64>) -> String {
    match rating {
        Some(r) => format!("{}/10", r),
        None => "-".to_string(),
    }
}

/// Change in rating from `before` to `after`.
pub fn rating_delta(before: Option<i64>, after: Option<i64>) -> String {
    match (before, after) {
        (Some(a), Some(b)) if b > a => format!("+{}", b - a),
        (Some(a), Some(b)) => format!("{}", b - a),
        _ => "n/a".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}

fn opt(s: &Option<String>) -> &str {
    s.as_deref().unwrap_or("-")
}

pub fn render_comparison(first: &SwingRecord, second: &SwingRecord) -> String {
    const W: usize = 36;
    let row = |label: &str, a: &str, b: &str| {
        format!("{:<12} {:<W$} {:<W$}\n", label, truncate(a, W), truncate(b, W), W = W)
    };

    let mut out = String::new();
    out.push_str(&row("", &format!("#{}", first.id), &format!("#{}", second.id)));
    out.push_str(&row(
        "Date",
        &first.created_at.format("%Y-%m-%d %H:%M").to_string(),
        &second.created_at.format("%Y-%m-%d %H:%M").to_string(),
    ));
    out.push_str(&row("Rating", &format_rating(first.rating), &format_rating(second.rating)));
    out.push_str(&row("Club", opt(&first.club), opt(&second.club)));
    out.push_str(&row("Outcome", opt(&first.shot_outcome), opt(&second.shot_outcome)));
    out.push_str(&row("Focus", opt(&first.focus_area), opt(&second.focus_area)));
    out.push_str(&row("Positions", &first.positions_analyzed, &second.positions_analyzed));
    out.push_str(&row("Summary", opt(&first.summary), opt(&second.summary)));
    out.push_str(&format!(
        "\nRating change: {}\n",
        rating_delta(first.rating, second.rating)
    ));
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a request and return the JSON body, turning API errors into their
/// `detail` message.
fn send_json(req: RequestBuilder, url: &str) -> anyhow::Result<serde_json::Value> {
    let resp = req
        .send()
        .with_context(|| format!("connection failed to {}", url))?;
    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();

    if !status.is_success() {
        let detail = body["detail"]
            .as_str()
            .or_else(|| body["error"].as_str())
            .unwrap_or("no details");
        bail!("server returned {}: {}", status, detail);
    }
    Ok(body)
}

fn fetch_swing(server: &str, id: i64) -> anyhow::Result<(SwingRecord, serde_json::Value)> {
    let url = format!("{}/api/swings/{}", server, id);
    let body = send_json(client(30)?.get(&url), &url)?;
    let swing = serde_json::from_value(body.clone()).context("failed to parse swing record")?;
    Ok((swing, body))
}

struct AnalyzeArgs {
    images: Vec<(SwingPosition, PathBuf)>,
    club: Option<String>,
    shot_outcome: Option<String>,
    focus_area: Option<String>,
    notes: Option<String>,
    json: bool,
}

fn do_analyze(server: &str, args: AnalyzeArgs) -> anyhow::Result<()> {
    if args.images.is_empty() {
        bail!("at least one image is required (--address, --top, --impact, --follow-through)");
    }

    let mut form = multipart::Form::new();
    for (position, path) in &args.images {
        let image = prepare_image(*position, path)?;
        let field = image.position.as_str();
        let part = multipart::Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(image.media_type)?;
        form = form.part(field, part);
    }
    let annotations = [
        ("club", args.club),
        ("shot_outcome", args.shot_outcome),
        ("focus_area", args.focus_area),
        ("notes", args.notes),
    ];
    for (name, value) in annotations {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            form = form.text(name, v);
        }
    }

    eprintln!("Analyzing {} image(s)...", args.images.len());
    let url = format!("{}/api/swings/analyze", server);
    let body = send_json(client(ANALYZE_TIMEOUT_SECS)?.post(&url).multipart(form), &url)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let result: AnalyzeResponse =
        serde_json::from_value(body).context("failed to parse analysis response")?;
    println!("{} (#{})", result.message, result.swing_id);
    println!("Rating:  {}", format_rating(result.rating));
    if let Some(summary) = &result.summary {
        println!("Summary: {}", summary);
    }
    println!("\n{}", result.analysis);
    Ok(())
}

fn do_history(
    server: &str,
    limit: u32,
    offset: u32,
    sort: HistorySort,
    json_output: bool,
) -> anyhow::Result<()> {
    let url = format!("{}/api/swings/history", server);
    let req = client(30)?
        .get(&url)
        .query(&[("limit", limit), ("offset", offset)]);
    let body = send_json(req, &url)?;
    let mut history: HistoryResponse =
        serde_json::from_value(body).context("failed to parse history response")?;
    sort_history(&mut history.swings, sort);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&history.swings)?);
        return Ok(());
    }

    if history.swings.is_empty() {
        eprintln!("No swings analyzed yet");
        return Ok(());
    }
    println!("{} of {} swing(s)\n", history.swings.len(), history.total);
    for s in &history.swings {
        println!(
            "#{:<5} {}  {:>5}  {:<10} {:<12} {}",
            s.id,
            s.created_at.format("%Y-%m-%d %H:%M"),
            format_rating(s.rating),
            truncate(opt(&s.club), 10),
            truncate(opt(&s.shot_outcome), 12),
            truncate(opt(&s.summary), 60)
        );
    }
    Ok(())
}

fn do_show(server: &str, id: i64, json_output: bool, save_images: Option<PathBuf>) -> anyhow::Result<()> {
    let (swing, body) = fetch_swing(server, id)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("Swing #{} — {}", swing.id, swing.created_at.format("%Y-%m-%d %H:%M"));
        println!("Rating:     {}", format_rating(swing.rating));
        println!("Positions:  {}", swing.positions_analyzed);
        println!("Club:       {}", opt(&swing.club));
        println!("Outcome:    {}", opt(&swing.shot_outcome));
        println!("Focus:      {}", opt(&swing.focus_area));
        println!("Notes:      {}", opt(&swing.notes));
        println!("\n{}", swing.analysis);
    }

    if let Some(dir) = save_images {
        std::fs::create_dir_all(&dir).with_context(|| format!("cannot create {}", dir.display()))?;
        for (position, data) in swing.images.iter() {
            let bytes = decode_base64(data)?;
            let path = dir.join(export_file_name(swing.id, *position, &bytes));
            std::fs::write(&path, &bytes).with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!("Saved {}", path.display());
        }
    }
    Ok(())
}

fn do_compare(server: &str, first: i64, second: i64) -> anyhow::Result<()> {
    if first == second {
        bail!("pick two different swings to compare");
    }
    let (a, _) = fetch_swing(server, first)?;
    let (b, _) = fetch_swing(server, second)?;
    print!("{}", render_comparison(&a, &b));
    Ok(())
}

fn do_delete(server: &str, id: i64) -> anyhow::Result<()> {
    let url = format!("{}/api/swings/{}", server, id);
    let body = send_json(client(30)?.delete(&url), &url)?;
    println!(
        "{}",
        body["message"].as_str().unwrap_or("Swing deleted successfully")
    );
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let body = send_json(client(10)?.get(&url), &url)?;
    println!("Golf Coach server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:           {}", body["version"].as_str().unwrap_or("?"));
    println!("SQLite:            {}", body["sqlite_version"].as_str().unwrap_or("?"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Analyze {
            address,
            top,
            impact,
            follow_through,
            club,
            shot_outcome,
            focus_area,
            notes,
            json,
        } => {
            let images = [
                (SwingPosition::Address, address),
                (SwingPosition::Top, top),
                (SwingPosition::Impact, impact),
                (SwingPosition::FollowThrough, follow_through),
            ]
            .into_iter()
            .filter_map(|(p, path)| path.map(|path| (p, path)))
            .collect();
            do_analyze(
                &server,
                AnalyzeArgs {
                    images,
                    club,
                    shot_outcome,
                    focus_area,
                    notes,
                    json,
                },
            )
        }
        Commands::History {
            limit,
            offset,
            sort,
            json,
        } => do_history(&server, limit, offset, sort, json),
        Commands::Show {
            id,
            json,
            save_images,
        } => do_show(&server, id, json, save_images),
        Commands::Compare { first, second } => do_compare(&server, first, second),
        Commands::Delete { id } => do_delete(&server, id),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("golf-coach-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
