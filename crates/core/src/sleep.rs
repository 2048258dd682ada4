use rand::Rng;
use std::thread;
use std::time::Duration;

/// Sleep for `ms` milliseconds with +/-`ratio` random jitter.
/// A zero ratio sleeps exactly.
pub fn sleep_jitter(ms: u64, ratio: f64) {
    if ratio <= 0.0 || ms == 0 {
        sleep_ms(ms);
        return;
    }
    let base = ms as f64 / 1000.0;
    let jitter = base * ratio;
    let actual = base + rand::thread_rng().gen_range(-jitter..jitter);
    thread::sleep(Duration::from_secs_f64(actual.max(0.001)));
}

/// Sleep for exact milliseconds (no jitter).
pub fn sleep_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}
