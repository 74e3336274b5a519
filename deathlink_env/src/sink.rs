//! Status line sink.

use tracing::info;

/// Append-only sink for human-readable status lines.
pub trait StatusSink: Send + Sync {
    fn append(&self, line: &str);
}

/// Sink that forwards status lines to `tracing`, tagged with the player.
#[derive(Debug, Default, Clone)]
pub struct TracingSink {
    player: String,
}

impl TracingSink {
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }
}

impl StatusSink for TracingSink {
    fn append(&self, line: &str) {
        info!(target: "deathlink::status", player = %self.player, "{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tracing_sink_as_trait_object() {
        let sink: Arc<dyn StatusSink> = Arc::new(TracingSink::new("Feldspar"));
        // No subscriber installed: the line is simply discarded
        sink.append("Feldspar went for a swim.");
        assert_eq!(TracingSink::new("Feldspar").player(), "Feldspar");
    }
}
