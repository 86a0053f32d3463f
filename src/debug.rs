use pretty_dtoa::{dtoa, FmtFloatConfig};

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(9);

pub fn format_f64(f: f64) -> String {
    dtoa(f, FLOAT_CONFIG)
}

pub fn format_f64_vec(v: &[f64]) -> String {
    let a: Vec<String> = v.iter().map(|f| format_f64(*f)).collect();
    format!("[{}]", a.join(", "))
}

/// Formats `name=value` pairs, one per line.
pub fn format_named(names: &[&str], values: &[f64]) -> String {
    names
        .iter()
        .zip(values)
        .map(|(n, v)| format!("{} = {}", n, format_f64(*v)))
        .collect::<Vec<String>>()
        .join("\n")
}
