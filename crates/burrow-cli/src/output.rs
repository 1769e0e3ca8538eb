//! Formatted output helpers for CLI commands.
//!
//! Layer progress goes to stderr; stdout belongs to the sandboxed command.

use burrow_image::layer::{ExtractedLayer, PullProgress};
use burrow_image::manifest::Descriptor;

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Prints one line per layer as it is pulled.
#[derive(Debug)]
pub struct LayerProgress {
    image: String,
}

impl LayerProgress {
    /// Creates a printer for `image`.
    #[must_use]
    pub const fn new(image: String) -> Self {
        Self { image }
    }
}

impl PullProgress for LayerProgress {
    fn layer_started(&self, index: usize, total: usize, layer: &Descriptor) {
        if index == 1 {
            eprintln!("  Pulling {}", self.image);
        }
        eprintln!(
            "  {DIM}[{index}/{total}]{RESET} {} {DIM}({}){RESET}",
            layer.digest.short(),
            format_bytes(layer.size)
        );
    }

    fn layer_finished(&self, layer: &ExtractedLayer) {
        tracing::debug!(index = layer.index, entries = layer.entries, "layer done");
        eprintln!(
            "  {GREEN}✓{RESET} {} {DIM}{} entries{RESET}",
            layer.digest.short(),
            layer.entries
        );
    }
}

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_displays_bytes() {
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn format_bytes_displays_mib() {
        assert_eq!(format_bytes(3_355_443), "3.2 MiB");
    }

    #[test]
    fn format_bytes_displays_gib() {
        assert_eq!(format_bytes(2_147_483_648), "2.0 GiB");
    }
}
