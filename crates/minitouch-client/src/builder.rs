//! Command batch assembly
//!
//! A [`CommandBuilder`] collects protocol lines for one logical operation and
//! publishes them in a single write. minitouch gives no completion signal,
//! so publishing blocks for the batch's own wait time plus a settle delay
//! before returning.

use std::fmt::Write as _;
use std::time::Duration;

use crate::connection::CommandSink;
use crate::error::Result;
use crate::types::ContactId;

/// Pause after every publish unless configured otherwise
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(20);

/// Accumulates press/move/release/wait/commit lines into one batch
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    content: String,
    total_wait_ms: u64,
    committed: bool,
    settle_delay: Duration,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::with_settle_delay(DEFAULT_SETTLE_DELAY)
    }

    pub fn with_settle_delay(settle_delay: Duration) -> Self {
        Self {
            content: String::new(),
            total_wait_ms: 0,
            committed: false,
            settle_delay,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    fn append(&mut self, args: std::fmt::Arguments<'_>) -> &mut Self {
        // Writing into a String cannot fail
        let _ = self.content.write_fmt(args);
        self.content.push('\n');
        self.committed = false;
        self
    }

    /// `d <id> <x> <y> <pressure>`
    pub fn press(&mut self, contact: ContactId, x: i32, y: i32, pressure: u32) -> &mut Self {
        self.append(format_args!("d {} {} {} {}", contact, x, y, pressure))
    }

    /// `m <id> <x> <y> <pressure>`
    pub fn move_to(&mut self, contact: ContactId, x: i32, y: i32, pressure: u32) -> &mut Self {
        self.append(format_args!("m {} {} {} {}", contact, x, y, pressure))
    }

    /// `u <id>`
    pub fn release(&mut self, contact: ContactId) -> &mut Self {
        self.append(format_args!("u {}", contact))
    }

    /// `w <ms>`, also counted towards the post-publish pause
    pub fn wait(&mut self, ms: u64) -> &mut Self {
        self.total_wait_ms = self.total_wait_ms.saturating_add(ms);
        self.append(format_args!("w {}", ms))
    }

    /// `c`: apply everything since the previous commit at once
    pub fn commit(&mut self) -> &mut Self {
        self.content.push_str("c\n");
        self.committed = true;
        self
    }

    pub fn reset(&mut self) {
        self.content.clear();
        self.total_wait_ms = 0;
        self.committed = false;
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Sum of all `wait` durations in the batch
    pub fn total_wait(&self) -> Duration {
        Duration::from_millis(self.total_wait_ms)
    }

    /// Send the batch and wait for minitouch to play it out.
    ///
    /// A trailing commit is added when missing. The builder is empty again
    /// afterwards, whether or not the send succeeded.
    pub fn publish<S: CommandSink + ?Sized>(&mut self, sink: &mut S) -> Result<Vec<u8>> {
        if !self.committed {
            self.commit();
        }

        let text = std::mem::take(&mut self.content);
        let pause = self.total_wait() + self.settle_delay;
        self.reset();

        let ack = sink.send(&text)?;
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
        Ok(ack)
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}
