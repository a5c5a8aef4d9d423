use anyhow::{Context, Result};
use rodio::source::{SineWave, Source};
use rodio::{OutputStream, Sink};
use std::sync::mpsc;
use tracing::{debug, warn};

/// Low background hum played while the galactic reader is open
///
/// `OutputStream` cannot leave the thread that created it, so playback lives
/// on its own thread. Neither starting nor dropping the handle waits on that
/// thread, so both are safe to call from async code. Dropping signals the
/// thread to stop the sink and exit.
pub struct AmbientHum {
    stop_tx: mpsc::Sender<()>,
}

/// Base frequency of the hum (Hz)
const HUM_FREQUENCY: f32 = 55.0;

impl AmbientHum {
    /// Spawn the audio thread. A missing output device is only logged, since
    /// the thread finds out after this returns.
    pub fn start(volume: f32) -> Result<Self> {
        let volume = volume.clamp(0.0, 1.0);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("ambient-hum".to_string())
            .spawn(move || {
                if let Err(e) = play_until_stopped(volume, &stop_rx) {
                    warn!("Ambient audio unavailable: {}", e);
                }
            })
            .context("Failed to spawn audio thread")?;

        Ok(Self { stop_tx })
    }
}

fn play_until_stopped(volume: f32, stop_rx: &mpsc::Receiver<()>) -> Result<()> {
    let (_stream, handle) = OutputStream::try_default().context("No audio output")?;
    let sink = Sink::try_new(&handle).context("Could not open audio sink")?;

    sink.set_volume(volume);
    let hum = SineWave::new(HUM_FREQUENCY)
        .amplify(0.5)
        .mix(SineWave::new(HUM_FREQUENCY * 1.5).amplify(0.25));
    sink.append(hum);
    debug!("Ambient hum started at volume {}", volume);

    // Returns on stop or when the handle is dropped
    let _ = stop_rx.recv();
    sink.stop();
    debug!("Ambient hum stopped");
    Ok(())
}

impl Drop for AmbientHum {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_start_and_drop_return_without_waiting_for_audio() {
        // Holds whether or not the machine has an output device
        let started = Instant::now();
        let hum = AmbientHum::start(0.0).unwrap();
        drop(hum);
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
