//! Checkpointing
//!
//! A periodic save parks every worker at a pass boundary (save mutex), copies
//! the hash table and, when requested, the kangaroo states into a flat
//! payload, then hands the payload to a single background writer. Workers
//! resume as soon as the snapshot is captured; save ticks that fire while a
//! write is still in flight are skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, Sender};
use log::{info, warn};

use crate::kangaroo::context::KeyContext;
use crate::types::KangarooState;
use crate::workfile::{save_work_binary, save_work_text, TableImage, WorkHeader};

pub struct SavePayload {
    pub binary_path: Option<std::path::PathBuf>,
    pub text_path: Option<std::path::PathBuf>,
    pub header: WorkHeader,
    pub table: TableImage,
    pub kangaroos: Option<Vec<KangarooState>>,
}

/// Owns the background writer thread. At most one write is in flight.
pub struct CheckpointWriter {
    tx: Option<Sender<SavePayload>>,
    handle: Option<JoinHandle<()>>,
    busy: Arc<AtomicBool>,
}

impl CheckpointWriter {
    pub fn new() -> Self {
        let (tx, rx) = bounded::<SavePayload>(1);
        let busy = Arc::new(AtomicBool::new(false));
        let busy_writer = Arc::clone(&busy);
        let handle = std::thread::spawn(move || {
            for payload in rx.iter() {
                write_payload(&payload);
                busy_writer.store(false, Ordering::Release);
            }
        });
        CheckpointWriter { tx: Some(tx), handle: Some(handle), busy }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn submit(&self, payload: SavePayload) {
        self.busy.store(true, Ordering::Release);
        if let Some(tx) = &self.tx {
            if tx.send(payload).is_err() {
                self.busy.store(false, Ordering::Release);
                warn!("checkpoint writer is gone, snapshot dropped");
            }
        }
    }

    /// Wait for any pending write and stop the writer.
    pub fn shutdown(mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for CheckpointWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_payload(payload: &SavePayload) {
    if let Some(path) = &payload.binary_path {
        match save_work_binary(path, &payload.header, &payload.table, payload.kangaroos.as_deref())
        {
            Ok(size) => info!(
                "SaveWork: {} [{:.1} MB]",
                path.display(),
                size as f64 / (1024.0 * 1024.0)
            ),
            // a failed checkpoint never stops the search
            Err(e) => warn!("SaveWork: cannot write {}: {e}", path.display()),
        }
    }
    if let Some(path) = &payload.text_path {
        match save_work_text(path, &payload.header, &payload.table, payload.kangaroos.as_deref()) {
            Ok(size) => info!(
                "SaveWorkTxt: {} [{:.1} MB]",
                path.display(),
                size as f64 / (1024.0 * 1024.0)
            ),
            Err(e) => warn!("SaveWorkTxt: cannot write {}: {e}", path.display()),
        }
    }
}

/// Park the workers, capture a consistent snapshot and queue it for writing.
pub fn save_work(ctx: &KeyContext, writer: &CheckpointWriter, total_count: u64, total_time: f64) {
    if writer.is_busy() {
        info!("SaveWork: previous async save still in progress, skipping interval");
        return;
    }
    if ctx.params.work_file.is_none() && ctx.params.work_text_file.is_none() {
        return;
    }

    let guard = ctx.save_barrier.lock().unwrap();
    ctx.save_request.store(true, Ordering::Release);
    while !ctx.all_waiting() && ctx.is_alive() && !ctx.ended() {
        std::thread::sleep(Duration::from_millis(10));
    }

    let suffix = if ctx.params.split_workfile {
        let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        format!("_{ts}")
    } else {
        String::new()
    };
    let with_suffix = |p: &std::path::PathBuf| {
        let mut s = p.as_os_str().to_os_string();
        s.push(&suffix);
        std::path::PathBuf::from(s)
    };

    let table_image = {
        let table = ctx.table.lock().unwrap();
        TableImage::capture(&table)
    };
    let kangaroos = if ctx.params.save_kangaroo {
        let mut all = Vec::new();
        for slot in &ctx.workers {
            all.extend(slot.herd_snapshot.lock().unwrap().iter().copied());
        }
        Some(all)
    } else {
        None
    };

    let payload = SavePayload {
        binary_path: ctx.params.work_file.as_ref().map(&with_suffix),
        text_path: ctx.params.work_text_file.as_ref().map(&with_suffix),
        header: WorkHeader {
            dp_bits: ctx.params.dp_bits.max(0) as u32,
            range_start: ctx.range.start,
            range_end: ctx.range.end,
            key: ctx.key,
            total_count,
            total_time,
        },
        table: table_image,
        kangaroos,
    };

    ctx.save_request.store(false, Ordering::Release);
    if ctx.params.split_workfile {
        ctx.table.lock().unwrap().reset();
    }
    drop(guard);

    writer.submit(payload);
}
