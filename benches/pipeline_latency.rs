// End-to-end pipeline latency against a stub shell toolchain.
// Measures workspace setup, both stage launches and teardown.
// Target: p50 < 100ms, p95 < 200ms per request on an idle host

use compilebox::{HostEnvironment, Pipeline, PipelineConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ITERATIONS: usize = 100;
const WARMUP_ITERATIONS: usize = 10;
const CONCURRENCY: usize = 8;

const COMPILER: &str = "#!/bin/sh\n{ printf '\\t.globl main\\nmain:\\n'; cat \"$1\"; } > \"${1%.*}.s\"\n";
const ASSEMBLER: &str = "#!/bin/sh\nwhile [ $# -gt 0 ]; do if [ \"$1\" = -o ]; then shift; out=\"$1\"; fi; shift; done\nprintf '#!/bin/sh\\necho 7\\n' > \"$out\"\nchmod +x \"$out\"\n";

const SOURCE: &str = "fun main() {\n    println(7)\n}\n";

struct LatencyStats {
    p50: Duration,
    p95: Duration,
    p99: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();
        let at = |q: f64| samples[((len as f64 * q) as usize).min(len - 1)];

        let sum: Duration = samples.iter().sum();
        Self {
            p50: at(0.50),
            p95: at(0.95),
            p99: at(0.99),
            min: samples[0],
            max: samples[len - 1],
            mean: sum / len as u32,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  p99: {:?}", self.p99);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    passed: bool,
    reason: Option<String>,
}

impl BenchmarkResult {
    fn judge(scenario: &str, stats: LatencyStats, p50: Duration, p95: Duration) -> Self {
        let passed = stats.p50 < p50 && stats.p95 < p95;
        let reason = (!passed).then(|| {
            format!(
                "p50={:?} (target <{:?}), p95={:?} (target <{:?})",
                stats.p50, p50, stats.p95, p95
            )
        });
        Self {
            scenario: scenario.to_string(),
            stats,
            passed,
            reason,
        }
    }

    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print("Latency");
        match &self.reason {
            None => println!("✅ PASS"),
            Some(reason) => println!("❌ FAIL: {}", reason),
        }
    }
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, body)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn write_script(path: &Path, body: &str) -> std::io::Result<()> {
    std::fs::write(path, body)
}

fn stub_pipeline(dir: &Path) -> Pipeline {
    let root = dir.join("toolchain");
    std::fs::create_dir_all(&root).expect("create toolchain root");
    write_script(&root.join("main.exe"), COMPILER).expect("write compiler");
    write_script(&root.join("fake-gxx"), ASSEMBLER).expect("write assembler");

    let mut config = PipelineConfig::for_toolchain_root(root.clone());
    config.host = HostEnvironment::Native;
    config.toolchain.assembler = root.join("fake-gxx").display().to_string();
    config.toolchain.shell = "sh".to_string();
    config.toolchain.shell_args = vec!["-c".to_string()];
    Pipeline::new(config).expect("build pipeline")
}

async fn sequential(pipeline: &Pipeline) -> BenchmarkResult {
    for _ in 0..WARMUP_ITERATIONS {
        let _ = pipeline.execute_source(SOURCE).await;
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let _ = pipeline.execute_source(SOURCE).await;
        samples.push(start.elapsed());
    }

    BenchmarkResult::judge(
        "Sequential requests",
        LatencyStats::from_samples(samples),
        Duration::from_millis(100),
        Duration::from_millis(200),
    )
}

async fn concurrent(pipeline: Arc<Pipeline>) -> BenchmarkResult {
    let mut samples = Vec::with_capacity(ITERATIONS);
    for _ in 0..ITERATIONS / CONCURRENCY {
        let mut handles = Vec::with_capacity(CONCURRENCY);
        for _ in 0..CONCURRENCY {
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                let start = Instant::now();
                let _ = pipeline.execute_source(SOURCE).await;
                start.elapsed()
            }));
        }
        for handle in handles {
            if let Ok(elapsed) = handle.await {
                samples.push(elapsed);
            }
        }
    }

    // Contention on process spawning: allow 3x the sequential budget
    BenchmarkResult::judge(
        &format!("{} concurrent requests", CONCURRENCY),
        LatencyStats::from_samples(samples),
        Duration::from_millis(300),
        Duration::from_millis(600),
    )
}

fn main() {
    println!("=== compilebox Pipeline Latency Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let dir = tempfile::tempdir().expect("create temp dir");
    let pipeline = Arc::new(stub_pipeline(dir.path()));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("build runtime");

    let results = runtime.block_on(async {
        vec![sequential(&pipeline).await, concurrent(pipeline.clone()).await]
    });

    for result in &results {
        result.print();
    }

    let passed_count = results.iter().filter(|r| r.passed).count();
    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, results.len());

    if passed_count == results.len() {
        println!("✅ All latency budgets met");
        std::process::exit(0);
    } else {
        println!("❌ Some latency budgets exceeded");
        std::process::exit(1);
    }
}
