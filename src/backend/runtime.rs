//! Environment functions available to jitted code.
//!
//! `print` is pre-registered into the JIT's symbol namespace by the driver.
//! Tests can redirect its output into a capture buffer instead of asserting
//! on stdout.

use std::sync::Mutex;

static CAPTURE: Mutex<Option<Vec<f64>>> = Mutex::new(None);

/// `print(double) -> double`: writes `print: <value>` with six decimals and
/// returns its argument.
pub extern "C" fn print(value: f64) -> f64 {
    let mut captured = false;
    if let Ok(mut guard) = CAPTURE.lock() {
        if let Some(buffer) = guard.as_mut() {
            buffer.push(value);
            captured = true;
        }
    }
    if !captured {
        println!("print: {:.6}", value);
    }
    value
}

/// Start capturing `print` output instead of writing it to stdout.
pub fn begin_capture() {
    if let Ok(mut guard) = CAPTURE.lock() {
        *guard = Some(Vec::new());
    }
}

/// Stop capturing and return everything printed since `begin_capture`.
pub fn end_capture() -> Vec<f64> {
    match CAPTURE.lock() {
        Ok(mut guard) => guard.take().unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_collects_values() {
        begin_capture();
        print(1.5);
        print(-2.0);
        assert_eq!(end_capture(), vec![1.5, -2.0]);
        // Capture is one-shot.
        assert!(end_capture().is_empty());
    }
}
