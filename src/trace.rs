//! Named, leveled trace channels.
//!
//! Every component owns one or more channels (conventionally `trace` for
//! register-level chatter and `info` for architecturally visible events).
//! Messages go through `tracing` with the component path and channel name
//! attached as structured fields, so a subscriber can filter per component.

use std::fmt;

/// A named logging channel owned by a component.
#[derive(Clone, Debug)]
pub struct Trace {
    component: String,
    channel: String,
}

impl Trace {
    /// Creates a channel for `component` named `channel`.
    pub fn new(component: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            channel: channel.into(),
        }
    }

    /// Returns the owning component's name.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Returns the channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        tracing::trace!(component = %self.component, channel = %self.channel, "{}", args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(component = %self.component, channel = %self.channel, "{}", args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(component = %self.component, channel = %self.channel, "{}", args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(component = %self.component, channel = %self.channel, "{}", args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(component = %self.component, channel = %self.channel, "{}", args);
    }
}
