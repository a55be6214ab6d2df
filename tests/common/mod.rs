#![allow(dead_code)]

/// 16-bit mono WAV holding `millis` of a 440 Hz tone at 8 kHz
pub fn wav_bytes(millis: u32) -> Vec<u8> {
    diktat::fixtures::clip_of(millis).unwrap()
}

pub fn paths_for(speed: &str, numbers: &[u32]) -> Vec<String> {
    numbers
        .iter()
        .map(|n| format!("/api/audio/{speed}/{n}"))
        .collect()
}
