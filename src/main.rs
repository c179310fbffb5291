//! screen-translator: translate the text inside a screen region, once or continuously.
//!
//! Frames are printed to stdout as JSON lines; logs go to stderr.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use screen_translator::config;
use screen_translator::frame::channel_sink;
use screen_translator::{
    init_tracing, CaptureFrame, ContinuousPipeline, PipelineComponents, Rectangle,
};

#[derive(Parser, Debug)]
#[command(name = "screen-translator", version, about = "Translate on-screen text in a region")]
struct Args {
    /// Screen region as x,y,width,height
    #[arg(short, long, value_name = "X,Y,W,H")]
    region: Selection,

    /// Translate once and exit
    #[arg(long)]
    once: bool,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target language, overrides the config
    #[arg(short, long)]
    target: Option<String>,

    /// Seconds between captures, overrides the config
    #[arg(short, long)]
    interval: Option<f64>,

    /// Emit logs as JSON
    #[arg(long = "json-logs")]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<i32> = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid region '{s}': {e}"))?;
        match parts.as_slice() {
            &[x, y, width, height] => Ok(Self {
                x,
                y,
                width,
                height,
            }),
            _ => Err(format!("region must be x,y,width,height, got '{s}'")),
        }
    }
}

/// One output line. Region boxes are in screen coordinates.
#[derive(Serialize)]
struct FrameLine {
    region: Rectangle,
    cleared: bool,
    regions: Vec<RegionLine>,
}

#[derive(Serialize)]
struct RegionLine {
    original: String,
    translated: String,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl From<&CaptureFrame> for FrameLine {
    fn from(frame: &CaptureFrame) -> Self {
        let regions = frame
            .regions
            .iter()
            .map(|r| {
                let (x, y, w, h) = r.screen_box(&frame.rect);
                RegionLine {
                    original: r.original_text.clone(),
                    translated: r.translated_text.clone(),
                    x,
                    y,
                    w,
                    h,
                }
            })
            .collect();
        Self {
            region: frame.rect,
            cleared: frame.is_cleared(),
            regions,
        }
    }
}

fn print_frame(frame: &CaptureFrame) {
    match serde_json::to_string(&FrameLine::from(frame)) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize frame"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut cfg = config::load_or_default(args.config.as_deref())?;
    if let Some(target) = args.target {
        cfg.translate.target_lang = target;
    }
    if let Some(interval) = args.interval {
        cfg.pipeline.interval_secs = interval;
    }
    cfg.validate()?;

    let components =
        PipelineComponents::from_config(&cfg).context("failed to set up translation backend")?;
    if !components.recognizer.is_available() {
        bail!("OCR engine '{}' not found", cfg.ocr.tesseract_cmd);
    }

    let pipeline = ContinuousPipeline::new(components, cfg.pipeline.clone());
    let sel = args.region;

    if args.once {
        let Some(rect) = Rectangle::from_selection(
            sel.x,
            sel.y,
            sel.width,
            sel.height,
            cfg.pipeline.min_selection_px,
        ) else {
            bail!("region is too small");
        };
        let (tx, rx) = tokio::sync::oneshot::channel();
        pipeline.capture_once(rect, move |result| {
            let _ = tx.send(result);
        });
        let frame = rx.await.context("capture worker exited without a result")??;
        print_frame(&frame);
        return Ok(());
    }

    let (sink, frames) = channel_sink();
    let session = pipeline
        .start_selection(sel.x, sel.y, sel.width, sel.height, sink)
        .await?;
    if session.is_none() {
        bail!("region is too small");
    }

    let printer = std::thread::spawn(move || {
        for frame in frames {
            print_frame(&frame);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("interrupted, stopping");
    pipeline.stop().await;

    for (name, summary) in pipeline.metrics().summary() {
        info!(
            metric = %name,
            p50_us = summary.p50_us,
            p95_us = summary.p95_us,
            count = summary.count,
            "timing"
        );
    }

    drop(pipeline);
    if printer.is_finished() {
        let _ = printer.join();
    }
    Ok(())
}
