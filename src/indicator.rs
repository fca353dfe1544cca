//! # Status Indicator Module
//!
//! Glanceable recording mark. It never looks at the engine: whether the mark
//! is lit comes from the persisted settings alone, so it stays correct even
//! when the recorder has not been loaded yet.

use crate::settings::SettingsStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Notified after each committed flush
pub trait StatusIndicator: Send {
    fn redraw(&self);
}

#[derive(Debug, Default)]
struct IndicatorState {
    lit: AtomicBool,
    redraws: AtomicUsize,
}

/// Indicator lit iff the settings record says `recording`. Clones share state.
#[derive(Clone)]
pub struct SettingsIndicator<S: SettingsStore + Clone> {
    settings: S,
    state: Arc<IndicatorState>,
}

impl<S: SettingsStore + Clone> SettingsIndicator<S> {
    pub fn new(settings: S) -> Self {
        let indicator = Self {
            settings,
            state: Arc::new(IndicatorState::default()),
        };
        indicator.redraw();
        indicator
    }

    pub fn is_lit(&self) -> bool {
        self.state.lit.load(Ordering::SeqCst)
    }

    pub fn redraw_count(&self) -> usize {
        self.state.redraws.load(Ordering::SeqCst)
    }
}

impl<S: SettingsStore + Clone> StatusIndicator for SettingsIndicator<S> {
    fn redraw(&self) {
        // Unreadable settings draw as "not recording"
        let lit = self.settings.read().map(|r| r.recording).unwrap_or(false);
        let was = self.state.lit.swap(lit, Ordering::SeqCst);
        self.state.redraws.fetch_add(1, Ordering::SeqCst);
        if was != lit {
            log::info!("Recording indicator {}", if lit { "on" } else { "off" });
        }
    }
}
