//! Output formatting

use serde::Serialize;

use crate::error::CliResult;

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

pub fn render<T: Serialize>(data: &T, format: OutputFormat) -> CliResult<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
    })
}

pub fn print_single<T: Serialize>(data: &T, format: OutputFormat) -> CliResult<()> {
    println!("{}", render(data, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_formats() {
        let data = serde_json::json!({ "valid": true });
        assert!(render(&data, OutputFormat::Json).unwrap().contains("\"valid\": true"));
        assert_eq!(render(&data, OutputFormat::Yaml).unwrap().trim(), "valid: true");
    }
}
