//! Small text helpers shared by the formatters and resolvers.

/// Insert `,` between groups of three digits in the integer part.
///
/// The fractional part and a leading sign are left untouched.
pub fn add_thousands_separators(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Decode hex as UTF-8 text, replacing invalid sequences.
///
/// Returns `None` when the input is not valid hex.
pub fn hex_to_string(hex_str: &str) -> Option<String> {
    let bytes = hex::decode(hex_str).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Shorten `text` to `length` characters, ending in `…` when cut
pub fn ellipsize(text: &str, length: usize) -> String {
    ellipsize_with(text, length, "…")
}

pub fn ellipsize_with(text: &str, length: usize, ending: &str) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }
    let keep = length.saturating_sub(ending.chars().count());
    let mut shortened: String = text.chars().take(keep).collect();
    shortened.push_str(ending);
    shortened
}

const SERVICE_BITS: [(u64, &str); 10] = [
    (1, "NODE_NETWORK"),
    (2, "NODE_GETUTXO"),
    (4, "NODE_BLOOM"),
    (8, "NODE_WITNESS"),
    (16, "NODE_XTHIN"),
    (32, "NODE_CASH"),
    (64, "NODE_GRAPHENE"),
    (128, "NODE_WEAKBLOCKS"),
    (256, "NODE_CF"),
    (1024, "NODE_NETWORK_LIMITED"),
];

/// Names of the service flags advertised by a peer
pub fn service_bits_to_names(services: u64) -> Vec<&'static str> {
    SERVICE_BITS
        .iter()
        .filter(|(bit, _)| services & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

pub fn output_type_name(output_type: &str) -> &'static str {
    match output_type {
        "pubkeyhash" => "Pay to Public Key Hash",
        "scripttemplate" => "Pay to Script Template",
        "nonstandard" => "Non-Standard",
        "nulldata" => "Null Data",
        _ => "???",
    }
}

pub fn output_type_abbreviation(output_type: &str) -> &'static str {
    match output_type {
        "pubkeyhash" => "p2pkh",
        "scripttemplate" => "p2st",
        "nonstandard" => "nonstandard",
        "nulldata" => "nulldata",
        _ => "???",
    }
}
