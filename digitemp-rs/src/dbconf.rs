//! Relational sink configuration.
//!
//! ```text
//! DBNAME digitemp
//! DBUSER logger
//! DBPASS secret
//! DBHOST localhost
//! DBTABLE temps
//! DBCOLUMNS SENSOR,BLANK,TEMPC,TIMESTAMP,SERIAL
//! ```

use core::{fmt, str::FromStr};
use std::{fs, io, path::Path};

use crate::error::ConfigError;

/// Table written to when none is configured.
pub const DEFAULT_TABLE: &str = "temps";

/// One value of a custom `INSERT` column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Sensor,
    TempC,
    TempF,
    Humi,
    Serial,
    Timestamp,
    /// An empty string literal.
    Blank,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Sensor,
        Column::TempC,
        Column::TempF,
        Column::Humi,
        Column::Serial,
        Column::Timestamp,
        Column::Blank,
    ];

    pub const fn keyword(self) -> &'static str {
        match self {
            Column::Sensor => "SENSOR",
            Column::TempC => "TEMPC",
            Column::TempF => "TEMPF",
            Column::Humi => "HUMI",
            Column::Serial => "SERIAL",
            Column::Timestamp => "TIMESTAMP",
            Column::Blank => "BLANK",
        }
    }
}

impl FromStr for Column {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .into_iter()
            .find(|c| c.keyword() == s)
            .ok_or(())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Parses a comma separated column list. Positions in errors are 1-based.
pub fn parse_columns(list: &str) -> Result<Vec<Column>, ConfigError> {
    list.split(',')
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(i, token)| {
            token.parse().map_err(|()| ConfigError::BadColumn {
                token: token.to_string(),
                position: i + 1,
            })
        })
        .collect()
}

/// Database connection and statement layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbConfig {
    pub name: String,
    pub user: String,
    pub pass: String,
    pub host: String,
    pub table: Option<String>,
    /// Empty for the default layout.
    pub columns: Vec<Column>,
}

impl DbConfig {
    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(DEFAULT_TABLE)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.trim_start();
            let (keyword, rest) = line
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((line, ""));
            let word = rest.split_whitespace().next().unwrap_or("").to_string();
            // Names and the column list may be quoted.
            let quoted = rest.trim().trim_matches('"').to_string();
            match keyword.to_ascii_uppercase().as_str() {
                "DBUSER" => config.user = word,
                "DBPASS" => config.pass = word,
                "DBHOST" => config.host = word,
                "DBNAME" => config.name = quoted,
                "DBTABLE" => config.table = Some(quoted).filter(|t| !t.is_empty()),
                "DBCOLUMNS" => config.columns = parse_columns(&quoted)?,
                _ => {
                    return Err(ConfigError::UnknownKeyword {
                        line: n + 1,
                        keyword: keyword.to_string(),
                    });
                }
            }
        }
        Ok(config)
    }

    /// Loads `path`. A missing file yields the default configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("{} not found, using the default table layout", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, DbConfig, parse_columns};
    use crate::error::ConfigError;

    #[test]
    fn parses_every_keyword() {
        let config = DbConfig::parse(
            "# sink\nDBNAME \"weather\"\nDBUSER logger\nDBPASS s3cret\n\ndbhost db.local\nDBTABLE readings\nDBCOLUMNS SENSOR,BLANK,TEMPC,HUMI,TIMESTAMP\n",
        )
        .unwrap();
        assert_eq!(config.name, "weather");
        assert_eq!(config.user, "logger");
        assert_eq!(config.pass, "s3cret");
        assert_eq!(config.host, "db.local");
        assert_eq!(config.table(), "readings");
        assert_eq!(
            config.columns,
            [
                Column::Sensor,
                Column::Blank,
                Column::TempC,
                Column::Humi,
                Column::Timestamp
            ]
        );
    }

    #[test]
    fn defaults_to_temps() {
        let config = DbConfig::parse("").unwrap();
        assert_eq!(config.table(), "temps");
        assert!(config.columns.is_empty());
    }

    #[test]
    fn bad_column_names_its_position() {
        let err = parse_columns("SENSOR,TEMPC,HUMIDITY").unwrap_err();
        match err {
            ConfigError::BadColumn { token, position } => {
                assert_eq!(token, "HUMIDITY");
                assert_eq!(position, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            DbConfig::parse("DBCOLUMNS tempc\n"),
            Err(ConfigError::BadColumn { position: 1, .. })
        ));
    }

    #[test]
    fn unknown_keyword() {
        assert!(matches!(
            DbConfig::parse("DBNAME x\nDBPORT 3306\n"),
            Err(ConfigError::UnknownKeyword { line: 2, .. })
        ));
    }

    #[test]
    fn missing_file_is_default() {
        let path = std::env::temp_dir().join("digitemp-dbconf-does-not-exist");
        assert_eq!(DbConfig::load(&path).unwrap(), DbConfig::default());
    }
}
