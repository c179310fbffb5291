//! Pipeline output and the seam that hands it to the UI layer.

use std::sync::Arc;

use crossbeam_channel as cb;
use image::RgbaImage;

use crate::capture::Rectangle;
use crate::grouping::TextRegion;

/// One tick's output: the captured image and its translated regions in reading order.
/// An empty region list means the overlay should be blanked.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub rect: Rectangle,
    pub image: Arc<RgbaImage>,
    pub regions: Vec<TextRegion>,
}

impl CaptureFrame {
    pub fn is_cleared(&self) -> bool {
        self.regions.is_empty()
    }

    /// All original region texts, one region per line.
    pub fn original_text(&self) -> String {
        self.regions
            .iter()
            .map(|r| r.original_text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All translated region texts, one region per line.
    pub fn translated_text(&self) -> String {
        self.regions
            .iter()
            .map(|r| r.translated_text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Receives frames from a session worker. Called off the UI thread; keep it quick.
pub trait FrameSink: Send + Sync + 'static {
    fn deliver(&self, frame: CaptureFrame);
}

impl<F> FrameSink for F
where
    F: Fn(CaptureFrame) + Send + Sync + 'static,
{
    fn deliver(&self, frame: CaptureFrame) {
        self(frame)
    }
}

/// Forwards frames into a channel so a UI thread can drain them on its own loop.
pub struct ChannelSink(cb::Sender<CaptureFrame>);

impl ChannelSink {
    pub fn new(tx: cb::Sender<CaptureFrame>) -> Self {
        Self(tx)
    }
}

impl FrameSink for ChannelSink {
    fn deliver(&self, frame: CaptureFrame) {
        if self.0.send(frame).is_err() {
            tracing::debug!("frame receiver dropped");
        }
    }
}

/// Unbounded channel sink and its receiving end.
pub fn channel_sink() -> (ChannelSink, cb::Receiver<CaptureFrame>) {
    let (tx, rx) = cb::unbounded();
    (ChannelSink(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(texts: &[(&str, &str)]) -> CaptureFrame {
        CaptureFrame {
            rect: Rectangle::new(0, 0, 20, 20),
            image: Arc::new(RgbaImage::new(20, 20)),
            regions: texts
                .iter()
                .map(|(o, t)| TextRegion {
                    original_text: o.to_string(),
                    translated_text: t.to_string(),
                    x: 0,
                    y: 0,
                    w: 1,
                    h: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn joined_texts_one_region_per_line() {
        let f = frame(&[("Hello", "Olá"), ("World", "Mundo")]);
        assert_eq!(f.original_text(), "Hello\nWorld");
        assert_eq!(f.translated_text(), "Olá\nMundo");
        assert!(!f.is_cleared());
        assert!(frame(&[]).is_cleared());
    }

    #[test]
    fn channel_sink_forwards_frames() {
        let (sink, rx) = channel_sink();
        sink.deliver(frame(&[("a", "b")]));
        assert_eq!(rx.try_recv().unwrap().translated_text(), "b");

        drop(rx);
        // receiver gone: delivery is silently dropped
        sink.deliver(frame(&[]));
    }

    #[test]
    fn closures_are_sinks() {
        let (tx, rx) = cb::unbounded();
        let sink = move |f: CaptureFrame| {
            let _ = tx.send(f.regions.len());
        };
        sink.deliver(frame(&[("a", "b"), ("c", "d")]));
        assert_eq!(rx.try_recv().unwrap(), 2);
    }
}
