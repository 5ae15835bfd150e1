//! Decode fuzz target: feed arbitrary bytes to every builtin schema.
//! Decoding must not panic, and any value it produces must encode again.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Ok(table) = ubxschema::SchemaTable::builtin() else {
        return;
    };
    let codec = ubxschema::Codec::new(table);
    for (key, _) in table.iter() {
        if let Ok(fields) = codec.decode(key.direction, &key.name, data) {
            let bytes = codec.encode(key.direction, &key.name, &fields);
            assert!(bytes.is_ok(), "{key}: decoded value does not re-encode");
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
