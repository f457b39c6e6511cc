#![no_main]

use chronoloop::fuzz::FuzzMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = FuzzMessage::deserialize(data) {
        let mut buffer = [0u8; 64];
        let len = message
            .serialize(&mut buffer)
            .expect("decoded message must serialize");

        // what we wrote has to decode to the same message
        let reparsed = FuzzMessage::deserialize(&buffer[..len]).expect("serialized message must parse");
        assert_eq!(message, reparsed);
    }
});
