use criterion::{Criterion, black_box, criterion_group, criterion_main};
use screentest::{DiffOptions, MockFramebuffer, compare};

fn benchmark_diff(c: &mut Criterion) {
    let options = DiffOptions::default();
    let baseline = MockFramebuffer::with_color(1920, 1080, [240, 240, 240, 255]);
    let mut current = baseline.clone();
    current.draw_rect(200, 200, 400, 300, [20, 20, 20, 255]);
    current.draw_text(40, 40, "Desktop_Star", [0, 0, 0, 255], [240, 240, 240, 255]);

    c.bench_function("diff_identical_1080p", |b| {
        b.iter(|| {
            let cmp = compare(black_box(baseline.image()), black_box(baseline.image()), &options);
            assert!(cmp.is_ok());
        })
    });

    c.bench_function("diff_changed_1080p", |b| {
        b.iter(|| {
            let cmp = compare(black_box(baseline.image()), black_box(current.image()), &options);
            assert!(cmp.is_ok());
        })
    });
}

criterion_group!(benches, benchmark_diff);
criterion_main!(benches);
