#![no_main]

use cadenza_audio::PersistedAudioState;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let (state, _) = PersistedAudioState::from_json(&value, 9);
    let (reparsed, repaired) = PersistedAudioState::from_json(&state.to_json(), 9);
    assert!(!repaired);
    assert_eq!(state, reparsed);
});
