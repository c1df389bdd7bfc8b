use std::time::Duration;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use tracing_subscriber::EnvFilter;

use rust_qrtrack::geometry::SE3;
use rust_qrtrack::marker::{ErrorCorrection, MarkerPayload};
use rust_qrtrack::sim::{self, facing_pose, SimRig, SimScene, SimulatedMarker};
use rust_qrtrack::{MarkerTracker, TrackerConfig};

/// Frame interval of the simulated cameras (30 Hz).
const FRAME_INTERVAL_NS: u64 = 33_333_333;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let num_frames: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse().with_context(|| format!("invalid frame count '{}'", arg))?,
        None => 90,
    };

    let scene = SimScene::new(vec![
        SimulatedMarker::new(
            MarkerPayload::new(1, ErrorCorrection::Medium, "https://example.com/door"),
            facing_pose(Vector3::new(-0.15, 0.0, 0.9)),
            0.16,
        ),
        SimulatedMarker::new(
            MarkerPayload::new(2, ErrorCorrection::Low, "shelf-42"),
            facing_pose(Vector3::new(0.2, 0.05, 1.1)),
            0.2,
        ),
    ])
    .into_shared();

    let rig = SimRig::vga_stereo();
    let config = TrackerConfig {
        detection_cadence: 10,
        tracking_lost_grace_timeout: Duration::from_millis(500),
        ..TrackerConfig::default()
    };
    let (sender, receiver) = crossbeam_channel::bounded(16);
    let mut tracker = MarkerTracker::new(config, sim::collaborators(scene.clone())).with_event_sink(sender);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .build()
        .context("creating worker pool")?;

    println!("Simulating {} frames", num_frames);

    for i in 0..num_frames {
        // the first marker is covered for a third of a second
        scene.write().markers[0].visible = !(30..40).contains(&i);

        let t_world_device = SE3::from_translation(Vector3::new(0.002 * i as f64, 0.0, 0.0));
        let timestamp_ns = i * FRAME_INTERVAL_NS;
        let frames = rig.render(&scene.read(), &t_world_device, timestamp_ns);

        let map = tracker.track_markers(&rig.cameras, &frames, &t_world_device, &rig.t_device_cameras, Some(&pool));

        let mut ids: Vec<_> = map.keys().copied().collect();
        ids.sort();
        let report = tracker.last_report();

        for event in receiver.try_iter() {
            println!("  new marker {}: {}", event.object_id, event.payload);
        }

        if i % 10 == 0 || report.detection_ran || !report.evicted_ids.is_empty() {
            println!(
                "Frame {:3}: detection={} tracked={} evicted={:?} ({:.2} ms)",
                report.frame_index,
                report.detection_ran,
                report.num_tracked,
                report.evicted_ids,
                report.timing.total_ms
            );
            for id in ids {
                let Some(marker) = tracker.get(id) else { continue };
                let t = marker.t_world_marker().translation;
                println!(
                    "  {} {:<8} {} size={:.3} m at [{:.3}, {:.3}, {:.3}]",
                    id,
                    marker.state(),
                    marker.payload(),
                    marker.size(),
                    t.x,
                    t.y,
                    t.z
                );
            }
        }
    }

    println!("Done! {} marker(s) tracked", tracker.len());

    Ok(())
}
