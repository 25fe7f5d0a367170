use std::path::Path;

const AV_TIME_BASE: f64 = 1_000_000.0;

/// Decodes the best audio stream of `path` to mono f32 PCM at `target_sample_rate`.
///
/// With a `window`, decoding seeks close to `start`, stops once `end` is
/// passed and returns only the samples inside `[start, end)`.
/// Returns `None` if the file has no audio stream.
pub fn decode_mono(
    path: &Path,
    target_sample_rate: u32,
    window: Option<(f64, f64)>,
) -> Result<Option<Vec<f32>>, Box<dyn std::error::Error>> {
    ffmpeg_next::init()?;

    let mut ictx = ffmpeg_next::format::input(path)?;

    let (audio_stream_index, codec_params, time_base) =
        match ictx.streams().best(ffmpeg_next::media::Type::Audio) {
            Some(stream) => (
                stream.index(),
                stream.parameters(),
                f64::from(stream.time_base()),
            ),
            None => return Ok(None),
        };

    if let Some((start, _)) = window {
        if start > 0.0 {
            let ts = (start * AV_TIME_BASE) as i64;
            ictx.seek(ts, ..ts)?;
        }
    }

    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(codec_params)?;
    let mut decoder = codec_ctx.decoder().audio()?;

    let mut resampler = ffmpeg_next::software::resampling::Context::get(
        decoder.format(),
        decoder.channel_layout(),
        decoder.rate(),
        ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Planar),
        ffmpeg_next::ChannelLayout::MONO,
        target_sample_rate,
    )?;

    let mut collector = WindowCollector::new(target_sample_rate, window);
    let mut decoded_frame = ffmpeg_next::util::frame::audio::Audio::empty();
    let mut resampled_frame = ffmpeg_next::util::frame::audio::Audio::empty();

    for (stream, packet) in ictx.packets() {
        if stream.index() != audio_stream_index {
            continue;
        }

        decoder.send_packet(&packet)?;

        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            let frame_time = decoded_frame
                .timestamp()
                .or_else(|| decoded_frame.pts())
                .map(|ts| ts as f64 * time_base);
            resampler.run(&decoded_frame, &mut resampled_frame)?;
            collector.push(frame_time, f32_samples(&resampled_frame));
        }

        if collector.is_complete() {
            return Ok(Some(collector.finish()));
        }
    }

    decoder.send_eof()?;
    while decoder.receive_frame(&mut decoded_frame).is_ok() {
        resampler.run(&decoded_frame, &mut resampled_frame)?;
        collector.push(None, f32_samples(&resampled_frame));
    }

    // The resampler may still hold buffered samples
    if let Ok(Some(delay)) = resampler.flush(&mut resampled_frame) {
        if delay.output > 0 {
            collector.push(None, f32_samples(&resampled_frame));
        }
    }

    Ok(Some(collector.finish()))
}

/// Total duration of a media file in seconds.
pub fn probe_duration(path: &Path) -> Result<f64, Box<dyn std::error::Error>> {
    ffmpeg_next::init()?;
    let ictx = ffmpeg_next::format::input(path)?;
    let duration = ictx.duration();
    if duration <= 0 {
        return Err(format!("Could not determine duration of {}", path.display()).into());
    }
    Ok(duration as f64 / AV_TIME_BASE)
}

/// f32 samples of a planar mono resampled frame.
fn f32_samples(frame: &ffmpeg_next::util::frame::audio::Audio) -> &[f32] {
    let num_samples = frame.samples();
    if num_samples == 0 {
        return &[];
    }
    let data = frame.data(0);
    unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, num_samples) }
}

/// Accumulates resampled audio and trims it to a time window.
///
/// Timing is anchored on the first timestamped frame; later blocks are
/// assumed contiguous.
struct WindowCollector {
    sample_rate: f64,
    window: Option<(f64, f64)>,
    origin: Option<f64>,
    samples: Vec<f32>,
}

impl WindowCollector {
    fn new(sample_rate: u32, window: Option<(f64, f64)>) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            window,
            origin: None,
            samples: Vec::new(),
        }
    }

    fn push(&mut self, frame_time: Option<f64>, block: &[f32]) {
        if self.origin.is_none() {
            self.origin = Some(frame_time.unwrap_or(0.0).max(0.0));
        }
        self.samples.extend_from_slice(block);
    }

    fn cursor(&self) -> f64 {
        self.origin.unwrap_or(0.0) + self.samples.len() as f64 / self.sample_rate
    }

    fn is_complete(&self) -> bool {
        match self.window {
            Some((_, end)) => self.origin.is_some() && self.cursor() >= end,
            None => false,
        }
    }

    fn finish(self) -> Vec<f32> {
        let Some((start, end)) = self.window else {
            return self.samples;
        };
        let origin = self.origin.unwrap_or(0.0);
        let to_index = |t: f64| (((t - origin) * self.sample_rate).round().max(0.0)) as usize;
        let first = to_index(start).min(self.samples.len());
        let last = to_index(end).min(self.samples.len());
        self.samples[first..last.max(first)].to_vec()
    }
}
