//! Adaptive jitter-buffer sizing.
//!
//! Both directions of the protocol buffer packets before consuming them: the
//! server buffers client inputs, the client buffers server snapshots. The
//! controller below watches how full such a buffer is every time it is
//! consumed from and picks the smallest target occupancy that still absorbs
//! the observed delivery jitter:
//!
//! - if a whole window of samples never dipped to half the target or below,
//!   the buffer carries more slack than it needs and the target halves;
//! - if the buffer ran dry after having been at or above target since the
//!   last growth, the target doubles.

use std::collections::VecDeque;

/// Tunables for [`BufferSizeController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferControllerConfig {
    /// Samples gathered before a shrink decision.
    pub window_len: usize,
    pub min_target: u32,
    pub max_target: u32,
    pub initial_target: u32,
}

impl Default for BufferControllerConfig {
    fn default() -> Self {
        Self {
            window_len: 60,
            min_target: 1,
            max_target: 32,
            initial_target: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferSizeController {
    config: BufferControllerConfig,
    target: u32,
    window: VecDeque<usize>,
    can_grow: bool,
}

impl BufferSizeController {
    pub fn new(config: BufferControllerConfig) -> Self {
        let target = config
            .initial_target
            .clamp(config.min_target.max(1), config.max_target.max(1));
        Self {
            config,
            target,
            window: VecDeque::with_capacity(config.window_len),
            can_grow: false,
        }
    }

    /// Feeds one occupancy observation.
    pub fn record_sample(&mut self, occupancy: usize) {
        self.window.push_back(occupancy);
        while self.window.len() > self.config.window_len {
            self.window.pop_front();
        }

        if self.window.len() >= self.config.window_len {
            let half = self.target as usize / 2;
            if self.target > self.config.min_target && self.window.iter().all(|&s| s > half) {
                self.target = (self.target / 2).max(self.config.min_target);
                self.window.clear();
            }
        }

        if occupancy == 0 && self.target < self.config.max_target && self.can_grow {
            self.target = (self.target * 2).min(self.config.max_target);
            self.can_grow = false;
        }

        if occupancy >= self.target as usize {
            self.can_grow = true;
        }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn config(&self) -> &BufferControllerConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }
}

impl Default for BufferSizeController {
    fn default() -> Self {
        Self::new(BufferControllerConfig::default())
    }
}
