//! Benchmarks for command configuration and argv assembly.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use otuflow::command::{CommandConfig, ExternalCommand};
use otuflow::utils::{format_fasta, quality_cut_index};

const CONFIG: &str = "\
# usearch global alignment
CMD usearch
ENV /opt/usearch
ARG -id 0.97      # identity
ARG -strand plus
ARG -threads 8
VAL -quiet
";

fn command_benchmark(c: &mut Criterion) {
    c.bench_function("parse_config", |b| {
        b.iter(|| CommandConfig::parse(black_box(CONFIG)))
    });

    let Ok(config) = CommandConfig::parse(CONFIG) else {
        return;
    };
    c.bench_function("configure_argv", |b| {
        b.iter(|| {
            let mut command = ExternalCommand::new("usearch");
            command
                .arg("-usearch_global", "pooled.fasta")
                .arg("-db", "otus.fasta")
                .arg("-uc", "map.uc");
            config.apply(&mut command);
            black_box(command.argv())
        })
    });
}

fn sequence_benchmark(c: &mut Criterion) {
    let bases = b"acgtnACGTN".repeat(50);
    c.bench_function("format_fasta", |b| b.iter(|| format_fasta(black_box(&bases), 80)));

    let qualities = b"IIIIIIIIII##########".repeat(15);
    c.bench_function("quality_cut_index", |b| {
        b.iter(|| quality_cut_index(black_box(&qualities), 33, 20))
    });
}

criterion_group!(benches, command_benchmark, sequence_benchmark);
criterion_main!(benches);
