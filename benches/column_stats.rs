use std::fmt::Write as _;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use sheet_analytics::chart::{ChartKind, map_series};
use sheet_analytics::decode::decode_workbook;
use sheet_analytics::export::{CsvStyle, encode_csv};
use sheet_analytics::intake::FileKind;
use sheet_analytics::normalize::Dataset;
use sheet_analytics::stats::compute_column_stats;

fn generate_orders(rows: usize) -> Vec<u8> {
    let mut text = String::from("id,region,amount,status\n");
    for i in 0..rows {
        let region = match i % 4 {
            0 => "North",
            1 => "South",
            2 => "East",
            _ => "West",
        };
        let amount = if i % 17 == 0 {
            String::new()
        } else {
            format!("{}.{:02}", (i * 37) % 5000, i % 100)
        };
        let status = if i % 3 == 0 { "shipped" } else { "pending" };
        let _ = writeln!(text, "{i},{region},{amount},{status}");
    }
    text.into_bytes()
}

fn generate_wide(rows: usize, columns: usize) -> Vec<u8> {
    let header = (0..columns).map(|c| format!("c{c}")).collect::<Vec<_>>();
    let mut text = header.join(",");
    text.push('\n');
    for r in 0..rows {
        let row = (0..columns)
            .map(|c| ((r * 31 + c) % 997).to_string())
            .collect::<Vec<_>>();
        let _ = writeln!(text, "{}", row.join(","));
    }
    text.into_bytes()
}

fn load(bytes: &[u8]) -> Dataset {
    let sheet = decode_workbook(bytes, Some(FileKind::Csv)).expect("decode orders");
    Dataset::from_grid(&sheet.grid)
}

fn bench_pipeline(c: &mut Criterion) {
    let bytes = generate_orders(50_000);
    let dataset = load(&bytes);

    c.bench_function("decode_normalize_50k", |b| {
        b.iter_batched(|| bytes.clone(), |bytes| load(&bytes), BatchSize::LargeInput)
    });

    c.bench_function("column_stats_50k", |b| {
        b.iter(|| compute_column_stats(&dataset.columns, &dataset.records))
    });

    c.bench_function("series_csv_export_50k", |b| {
        b.iter(|| {
            let series = map_series(&dataset.records, "region", "amount", ChartKind::Bar);
            encode_csv(&series, CsvStyle::Raw).expect("encode csv")
        })
    });

    let wide_bytes = generate_wide(2_000, 500);
    let wide = load(&wide_bytes);

    c.bench_function("decode_normalize_wide_500_columns", |b| {
        b.iter_batched(|| wide_bytes.clone(), |bytes| load(&bytes), BatchSize::LargeInput)
    });

    c.bench_function("column_stats_wide_500_columns", |b| {
        b.iter(|| compute_column_stats(&wide.columns, &wide.records))
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
