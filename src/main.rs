use std::path::PathBuf;

fn main() {
    let total_minutes = std::env::args()
        .nth(1)
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(30.0);
    let data_dir = std::env::var_os("FOCUSGUARD_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("focusguard-data"));

    if let Err(err) = focusguard_lib::run(&data_dir, total_minutes) {
        eprintln!("focusguard: {err:#}");
        std::process::exit(1);
    }
}
