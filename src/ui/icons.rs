//! Shared UI icons and emojis.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP]");

// Recovery indicators
pub static HINT: Emoji<'_, '_> = Emoji("💡 ", "-> ");
pub static RESUME: Emoji<'_, '_> = Emoji("🔄 ", "[RESUME]");

// Progress indicators
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
pub static HEART: Emoji<'_, '_> = Emoji("💓 ", "[H]");
