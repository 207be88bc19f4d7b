use std::sync::atomic::{AtomicU8, Ordering};

static DEBUG_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Set once at startup from the `-v` count; 3 is the deepest level used.
pub fn set_debug_level(level: u8) {
    DEBUG_LEVEL.store(level.min(3), Ordering::SeqCst);
}

pub fn get_debug_level() -> u8 {
    DEBUG_LEVEL.load(Ordering::SeqCst)
}

pub fn debug_log(level: u8, msg: impl AsRef<str>) {
    if get_debug_level() >= level {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        println!("[{}] [DEBUG:{}] {}", timestamp, level, msg.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_clamped_to_three() {
        set_debug_level(9);
        assert_eq!(get_debug_level(), 3);
        set_debug_level(0);
        assert_eq!(get_debug_level(), 0);
    }
}
