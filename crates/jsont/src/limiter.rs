/*
 * limiter.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Instruction-count governor.
//!
//! The context consults its limiter once before dispatching each
//! instruction and once before each formatter call. A hard limit aborts the
//! execution with `CODE_LIMIT_REACHED`, even in safe mode.

use std::cell::Cell;
use std::fmt;

use crate::error::{ErrorInfo, ExecuteErrorType};

const DEFAULT_RESOLUTION: usize = 64;

pub trait CodeLimiter {
    /// Count one instruction. An error aborts execution.
    fn check(&self) -> Result<(), ErrorInfo>;

    fn instruction_count(&self) -> usize;
}

/// Imposes no limit.
#[derive(Debug, Default)]
pub struct NoopCodeLimiter {
    count: Cell<usize>,
}

impl NoopCodeLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodeLimiter for NoopCodeLimiter {
    fn check(&self) -> Result<(), ErrorInfo> {
        self.count.set(self.count.get() + 1);
        Ok(())
    }

    fn instruction_count(&self) -> usize {
        self.count.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Soft,
    Hard,
}

impl LimitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitKind::Soft => "soft",
            LimitKind::Hard => "hard",
        }
    }
}

type LimitHandler = Box<dyn Fn(LimitKind, &HardSoftCodeLimiter)>;

/// Enforces a soft and a hard limit on the number of instructions executed.
///
/// Limits are tested every `resolution` instructions and each fires at most
/// once. Crossing the soft limit only notifies the handler. Crossing the
/// hard limit notifies the handler and then fails the check.
///
/// ```ignore
/// let limiter = HardSoftCodeLimiter::builder()
///     .soft_limit(10_000)
///     .hard_limit(100_000)
///     .handler(|kind, limiter| eprintln!("{:?} at {}", kind, limiter.instruction_count()))
///     .build();
/// ```
pub struct HardSoftCodeLimiter {
    soft_limit: usize,
    hard_limit: usize,
    resolution: usize,
    handler: Option<LimitHandler>,
    count: Cell<usize>,
    soft_fired: Cell<bool>,
    hard_fired: Cell<bool>,
}

impl HardSoftCodeLimiter {
    pub fn builder() -> HardSoftCodeLimiterBuilder {
        HardSoftCodeLimiterBuilder::default()
    }

    pub fn soft_limit(&self) -> usize {
        self.soft_limit
    }

    pub fn hard_limit(&self) -> usize {
        self.hard_limit
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    fn notify(&self, kind: LimitKind) {
        if let Some(handler) = &self.handler {
            handler(kind, self);
        }
    }
}

impl CodeLimiter for HardSoftCodeLimiter {
    fn check(&self) -> Result<(), ErrorInfo> {
        let count = self.count.get() + 1;
        self.count.set(count);
        if count % self.resolution != 0 {
            return Ok(());
        }

        if self.soft_limit > 0 && !self.soft_fired.get() && count > self.soft_limit {
            self.soft_fired.set(true);
            tracing::warn!(count, limit = self.soft_limit, "soft code limit reached");
            self.notify(LimitKind::Soft);
        }

        if self.hard_limit > 0 && !self.hard_fired.get() && count > self.hard_limit {
            self.hard_fired.set(true);
            tracing::warn!(count, limit = self.hard_limit, "hard code limit reached");
            self.notify(LimitKind::Hard);
            return Err(ErrorInfo::execute(ExecuteErrorType::CodeLimitReached)
                .with_name(LimitKind::Hard.as_str())
                .with_data(format!("after {} instructions", count))
                .with_limit(self.hard_limit));
        }
        Ok(())
    }

    fn instruction_count(&self) -> usize {
        self.count.get()
    }
}

impl fmt::Debug for HardSoftCodeLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardSoftCodeLimiter")
            .field("soft_limit", &self.soft_limit)
            .field("hard_limit", &self.hard_limit)
            .field("resolution", &self.resolution)
            .field("count", &self.count.get())
            .finish()
    }
}

/// Builder for [`HardSoftCodeLimiter`]. A limit of zero is never reached.
pub struct HardSoftCodeLimiterBuilder {
    soft_limit: usize,
    hard_limit: usize,
    resolution: usize,
    handler: Option<LimitHandler>,
}

impl Default for HardSoftCodeLimiterBuilder {
    fn default() -> Self {
        Self {
            soft_limit: 0,
            hard_limit: 0,
            resolution: DEFAULT_RESOLUTION,
            handler: None,
        }
    }
}

impl HardSoftCodeLimiterBuilder {
    pub fn soft_limit(mut self, limit: usize) -> Self {
        self.soft_limit = limit;
        self
    }

    pub fn hard_limit(mut self, limit: usize) -> Self {
        self.hard_limit = limit;
        self
    }

    /// Instructions between checks; at least 1.
    pub fn resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution.max(1);
        self
    }

    pub fn handler(mut self, handler: impl Fn(LimitKind, &HardSoftCodeLimiter) + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> HardSoftCodeLimiter {
        HardSoftCodeLimiter {
            soft_limit: self.soft_limit,
            hard_limit: self.hard_limit,
            resolution: self.resolution,
            handler: self.handler,
            count: Cell::new(0),
            soft_fired: Cell::new(false),
            hard_fired: Cell::new(false),
        }
    }
}
