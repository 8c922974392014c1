#![no_main]

//! Fuzz target for broker task payloads.

use libfuzzer_sys::fuzz_target;
use notify_worker::Task;

fuzz_target!(|data: &[u8]| {
    let Ok(task) = Task::from_slice(data) else {
        return;
    };

    // Anything that decodes must encode and decode back to the same task.
    let encoded = task.to_vec().expect("decoded task re-encodes");
    let decoded = Task::from_slice(&encoded).expect("re-encoded task decodes");
    assert_eq!(task, decoded);
    let _ = task.msg_receiver.to_string();
});
