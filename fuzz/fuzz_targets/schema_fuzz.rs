//! Schema fuzz target: feed arbitrary text to the schema parser and table builder.
//! Neither may panic; they return Ok or a SchemaError.
//! Build with: cargo fuzz run schema_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let _ = ubxschema::SchemaTable::builder().load_str(s).and_then(|b| b.build());
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run schema_fuzz");
}
