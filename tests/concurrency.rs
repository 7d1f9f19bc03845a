//! Independent jobs running at the same time share nothing.

mod common;

use std::path::PathBuf;

use audioconv::{ConvertOptions, Converter, ThreadCount};

fn fixture(directory: &tempfile::TempDir) -> PathBuf {
    let input = directory.path().join("tone.wav");
    common::write_wav(&input, 44_100, 2, 40_000);
    input
}

#[test]
fn parallel_jobs_produce_identical_output() {
    if !common::can_encode() {
        return;
    }
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let input = fixture(&directory);
    let outputs: Vec<PathBuf> = (0..4)
        .map(|n| directory.path().join(format!("out_{n}.m4a")))
        .collect();

    let input = &input;
    std::thread::scope(|scope| {
        let handles: Vec<_> = outputs
            .iter()
            .map(|output| scope.spawn(move || Converter::new(input, output).run()))
            .collect();
        for handle in handles {
            handle
                .join()
                .expect("Conversion thread panicked")
                .expect("Conversion failed");
        }
    });

    let reference = common::audio_payloads(&outputs[0]);
    for output in &outputs[1..] {
        assert_eq!(common::audio_payloads(output), reference);
    }
}

#[test]
fn codec_threads_do_not_change_packet_order() {
    if !common::can_encode() {
        return;
    }
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let input = fixture(&directory);
    let single = directory.path().join("single.m4a");
    let multi = directory.path().join("multi.m4a");

    let one = Converter::new(&input, &single).run().expect("Conversion failed");
    let four = Converter::new(&input, &multi)
        .options(ConvertOptions::new().with_threads(ThreadCount::new(4).unwrap()))
        .run()
        .expect("Conversion failed");

    assert_eq!(one.packets_written, four.packets_written);
    assert_eq!(common::audio_payloads(&single), common::audio_payloads(&multi));
}

#[cfg(feature = "rayon")]
#[test]
fn batch_results_keep_input_order() {
    if !common::can_encode() {
        return;
    }
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let input = fixture(&directory);
    let missing = directory.path().join("missing.wav");

    let jobs = vec![
        (input.clone(), directory.path().join("a.m4a")),
        (missing, directory.path().join("b.m4a")),
        (input, directory.path().join("c.m4a")),
    ];
    let results = audioconv::convert_batch(&jobs, &ConvertOptions::new());

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(audioconv::ConvertError::Open { .. })
    ));
    assert!(results[2].is_ok());
    assert!(!jobs[1].1.exists());
}

#[cfg(feature = "async")]
#[tokio::test]
async fn async_conversion() {
    if !common::can_encode() {
        return;
    }
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let input = fixture(&directory);
    let output = directory.path().join("async.m4a");

    let summary = Converter::new(&input, &output)
        .run_async()
        .await
        .expect("Conversion failed");
    assert!(summary.packets_written > 0);
    assert!(output.exists());
}
