//! Shared status icons, with plain-text fallbacks for dumb terminals.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP]");
pub static CACHED: Emoji<'_, '_> = Emoji("💾 ", "[CACHE]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
