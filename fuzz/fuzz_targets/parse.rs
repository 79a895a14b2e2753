#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &str| {
    miniliquid::Environment::new().template_from_str(input).ok();
});
