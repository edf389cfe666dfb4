//! Append-only JSONL activity log, one file per CLI session.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct Journal {
    pub path: PathBuf,
    session_id: String,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl Journal {
    /// Open (or create) `<dir>/<session_id>.jsonl`
    pub fn open(dir: &Path, session_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.jsonl", session_id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            session_id: session_id.to_string(),
            file,
        })
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            session_id: &self.session_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn session_start(&mut self, base_url: &str) -> Result<()> {
        self.log("session_start", serde_json::json!({ "base_url": base_url }))
    }

    pub fn login(&mut self, username: &str, ok: bool, error: Option<&str>) -> Result<()> {
        self.log(
            "login",
            serde_json::json!({ "username": username, "ok": ok, "error": error }),
        )
    }

    pub fn logout(&mut self) -> Result<()> {
        self.log("logout", serde_json::json!({}))
    }

    pub fn bookings_fetched(&mut self, page: u32, count: usize) -> Result<()> {
        self.log(
            "bookings_fetched",
            serde_json::json!({ "page": page, "count": count }),
        )
    }

    pub fn booking_created(&mut self, id: &str, dorm: &str) -> Result<()> {
        self.log(
            "booking_created",
            serde_json::json!({ "id": id, "dorm": dorm }),
        )
    }

    pub fn booking_failed(&mut self, dorm: &str, error: &str) -> Result<()> {
        self.log(
            "booking_failed",
            serde_json::json!({ "dorm": dorm, "error": error }),
        )
    }

    pub fn booking_cancelled(&mut self, id: &str, ok: bool) -> Result<()> {
        self.log(
            "booking_cancelled",
            serde_json::json!({ "id": id, "ok": ok }),
        )
    }
}
