use std::fs;
use std::process;

use dagsearch::settings;

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

pub fn settings_export() {
    print!("{}", settings::default_toml());
}

pub fn settings_validate(file: &str) {
    let content = die!(fs::read_to_string(file), "Error reading {file}: {}");
    let s = die!(settings::parse_settings_toml(&content), "Error: {}");
    println!(
        "OK: dag.min_ef_range={}, search.lm_weight={}, search.beam={:e}, search.nbest={}",
        s.dag.min_ef_range, s.search.lm_weight, s.search.beam, s.search.nbest
    );
}
