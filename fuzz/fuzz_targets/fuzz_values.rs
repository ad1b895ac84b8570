//! Fuzz target for writing and reading values with arbitrary types and data.
//!
//! Any declared type and payload must either round-trip or fail with an
//! error; nothing may panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use registry_bridge::prelude::*;
use std::sync::Arc;

#[derive(Arbitrary, Debug)]
enum Data {
    Text(String),
    Multi(Vec<String>),
    Number(u32),
    Bytes(Vec<u8>),
}

#[derive(Arbitrary, Debug)]
struct Input {
    name: String,
    kind: u32,
    data: Data,
}

struct Raw {
    name: String,
    kind: u32,
    data: Payload,
}

impl ValueObject for Raw {
    fn value_name(&self) -> &str {
        &self.name
    }

    fn value_type(&self) -> u32 {
        self.kind
    }

    fn data(&self) -> Option<&Payload> {
        Some(&self.data)
    }

    fn set_data(&mut self, data: Payload) -> Result<()> {
        self.data = data;
        Ok(())
    }
}

fuzz_target!(|input: Input| {
    let api = Arc::new(MemoryRegistry::new());
    let hkcu = RegistryKey::root(api.clone(), Predefined::CurrentUser);

    let data = match input.data {
        Data::Text(s) => Payload::Text(s),
        Data::Multi(v) => Payload::MultiText(v),
        Data::Number(n) => Payload::DWord(n),
        Data::Bytes(b) => Payload::Binary(b),
    };
    let value = Raw {
        name: input.name,
        kind: input.kind,
        data,
    };

    let embedded_nul = matches!(
        &value.data,
        Payload::MultiText(items) if items.iter().any(|s| s.contains('\0'))
    );

    match hkcu.set_value(&value.name, &value) {
        Ok(()) => {
            assert!(!(embedded_nul && value.kind == ValueKind::MultiString.raw()));
            let read = hkcu.get_value(&value.name);
            if let Ok(read) = read {
                assert_eq!(read.kind().raw(), value.kind);
            }
        }
        Err(e) => {
            if value.kind > ValueKind::MAX
                || (embedded_nul && value.kind == ValueKind::MultiString.raw())
            {
                assert_eq!(api.native_calls(), 0, "{e}");
            }
        }
    }
});
