// src/utils/progress_bars/logging.rs - Logging helpers for pipeline stages
use log::{debug, error, info, warn};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dedup,
    Persist,
    Scoring,
}

#[derive(Clone)]
pub struct StageLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl StageLogger {
    pub fn new(stage: Stage) -> Self {
        let (stage_name, stage_emoji) = match stage {
            Stage::Dedup => ("DEDUP", "🧬"),
            Stage::Persist => ("PERSIST", "💾"),
            Stage::Scoring => ("SCORING", "🎯"),
        };
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, run_id: &str, detail: &str) {
        info!(
            "[{}] {} 🚀 Starting {} (run ID: {}) - {}",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            run_id,
            detail
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, details, elapsed
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, elapsed
            ),
        }
    }

    pub fn log_blocking(&self, records: usize, blocks: usize, candidate_blocks: usize) {
        info!(
            "[{}] {} 📊 Blocking: {} records → {} blocks → {} blocks with 2+ records",
            self.stage_name, self.stage_emoji, records, blocks, candidate_blocks
        );
    }

    pub fn log_completion(&self, summary: &str) {
        info!(
            "[{}] {} 🎉 COMPLETED in {:.2?}: {}",
            self.stage_name,
            self.stage_emoji,
            self.start_time.elapsed(),
            summary
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_error(&self, message: &str) {
        error!("[{}] {} ❌ {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {} {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
