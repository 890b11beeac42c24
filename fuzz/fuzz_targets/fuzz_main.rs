// SPDX-License-Identifier: AGPL-3.0-or-later
#![no_main]

use folio_core::formats::{deserialize_from_markup, deserialize_from_persisted, serialize_to_persisted};
use folio_core::ExtensionRegistry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let registry = ExtensionRegistry::standard();

    if let Ok(doc) = deserialize_from_markup(&registry, input) {
        let _ = serialize_to_persisted(&doc);
    }
    let _ = deserialize_from_persisted(registry.schema(), input);
});
