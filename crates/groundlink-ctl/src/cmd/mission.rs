//! Mission upload, download, clear, cancel and survey commands.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::http::{base_url, get_json, post_json, post_json_body};

#[derive(Deserialize)]
struct UploadResponse {
    uploaded: usize,
}

#[derive(Deserialize)]
struct DownloadResponse {
    count: usize,
    plan: String,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct DoneResponse {
    ok: bool,
}

#[derive(Serialize)]
struct SurveyRequest {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
    altitude: f32,
    spacing: Option<f64>,
    upload: bool,
}

#[derive(Deserialize)]
struct SurveyResponse {
    count: usize,
    plan: String,
    uploaded: Option<usize>,
}

pub async fn cmd_upload(port: u16, file: &str) -> Result<()> {
    let plan = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file))?;
    let resp: UploadResponse =
        post_json_body(&format!("{}/mission/upload", base_url(port)), &json!({ "plan": plan }))
            .await?;
    println!("Uploaded {} mission items.", resp.uploaded);
    Ok(())
}

/// Print the plan, or write it to `file` when given.
pub async fn cmd_download(port: u16, file: Option<&str>) -> Result<()> {
    let resp: DownloadResponse = get_json(&format!("{}/mission/download", base_url(port))).await?;
    match file {
        Some(path) => {
            std::fs::write(Path::new(path), &resp.plan)
                .with_context(|| format!("failed to write {}", path))?;
            println!("Downloaded {} mission items to {}.", resp.count, path);
        }
        None => print!("{}", resp.plan),
    }
    Ok(())
}

pub async fn cmd_clear(port: u16) -> Result<()> {
    let _: DoneResponse = post_json(&format!("{}/mission/clear", base_url(port))).await?;
    println!("Mission cleared on the vehicle.");
    Ok(())
}

pub async fn cmd_cancel(port: u16) -> Result<()> {
    let _: DoneResponse = post_json(&format!("{}/mission/cancel", base_url(port))).await?;
    println!("Mission transfer cancelled.");
    Ok(())
}

/// `args`: north south east west altitude [spacing], then optional `--upload`
/// and an output file.
pub async fn cmd_survey(port: u16, args: &[&str]) -> Result<()> {
    let upload = args.contains(&"--upload");
    let rest: Vec<&str> = args.iter().copied().filter(|a| *a != "--upload").collect();
    if rest.len() < 5 {
        anyhow::bail!("survey needs <north> <south> <east> <west> <altitude> [spacing] [file]");
    }

    let num = |i: usize, what: &str| -> Result<f64> {
        rest[i]
            .parse::<f64>()
            .with_context(|| format!("{} must be a number, got {:?}", what, rest[i]))
    };
    let spacing = match rest.get(5) {
        Some(s) if s.parse::<f64>().is_ok() => Some(num(5, "spacing")?),
        _ => None,
    };
    let file_index = if spacing.is_some() { 6 } else { 5 };

    let req = SurveyRequest {
        north: num(0, "north")?,
        south: num(1, "south")?,
        east: num(2, "east")?,
        west: num(3, "west")?,
        altitude: num(4, "altitude")? as f32,
        spacing,
        upload,
    };
    let resp: SurveyResponse = post_json_body(&format!("{}/mission/survey", base_url(port)), &req).await?;

    match rest.get(file_index) {
        Some(path) => {
            std::fs::write(Path::new(path), &resp.plan)
                .with_context(|| format!("failed to write {}", path))?;
            println!("Wrote {} survey items to {}.", resp.count, path);
        }
        None if resp.uploaded.is_none() => print!("{}", resp.plan),
        None => {}
    }
    if let Some(n) = resp.uploaded {
        println!("Uploaded {} survey items.", n);
    }
    Ok(())
}
