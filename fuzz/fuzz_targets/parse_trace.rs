#![no_main]
use libfuzzer_sys::fuzz_target;
use pathwise_mc::ChoiceTrace;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(trace) = ChoiceTrace::parse(s) {
            let again = ChoiceTrace::parse(&trace.to_text()).unwrap();
            assert_eq!(trace, again);
        }
    }
});
