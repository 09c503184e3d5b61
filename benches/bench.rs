use criterion::{black_box, criterion_group, criterion_main, Criterion};

use corkboard::assemble::abbreviate_html;

pub fn bench_abbreviate(c: &mut Criterion) {
    let comment =
        "<p>an unhurried paragraph of filler prose for the line counter</p>"
            .repeat(200);

    c.bench_function("abbreviate", |b| {
        b.iter(|| abbreviate_html(black_box(&comment), 15, 150))
    });
}

criterion_group!(benches, bench_abbreviate);
criterion_main!(benches);
