#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use rust_xlsxwriter::Workbook;
use tempfile::{TempDir, tempdir};

pub const SALES_CSV: &str = "sales.csv";

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// One worksheet cell written by [`TestWorkspace::write_xlsx`].
pub enum Cell<'a> {
    Text(&'a str),
    Number(f64),
    Empty,
}

/// Scratch directory holding inputs, exports, the session config, and the
/// local store for one test case.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("sheet-analytics.yml")
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a single-sheet workbook; the first row is the header row.
    pub fn write_xlsx(&self, name: &str, rows: &[Vec<Cell<'_>>]) -> PathBuf {
        self.write_xlsx_sheets(name, &[("Sheet1", rows)])
    }

    /// Writes one worksheet per `(sheet name, rows)` entry, in order.
    pub fn write_xlsx_sheets(&self, name: &str, sheets: &[(&str, &[Vec<Cell<'_>>])]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut workbook = Workbook::new();
        for (sheet_name, rows) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*sheet_name).expect("sheet name");
            for (row_idx, row) in rows.iter().enumerate() {
                for (col_idx, cell) in row.iter().enumerate() {
                    let (r, c) = (row_idx as u32, col_idx as u16);
                    match cell {
                        Cell::Text(text) => {
                            worksheet.write_string(r, c, *text).expect("write string cell");
                        }
                        Cell::Number(value) => {
                            worksheet.write_number(r, c, *value).expect("write number cell");
                        }
                        Cell::Empty => {}
                    }
                }
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }

    /// The binary under test, pointed at this workspace's config file.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("sheet-analytics").expect("binary exists");
        cmd.current_dir(self.path())
            .env("SHEET_ANALYTICS_CONFIG", self.config_path());
        cmd
    }

    pub fn sign_in(&self) {
        self.command()
            .args([
                "session",
                "login",
                "--uid",
                "user-1",
                "--email",
                "ada@example.com",
            ])
            .assert()
            .success();
    }
}
