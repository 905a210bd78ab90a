//! Landmark frames and the JSON-lines source that delivers them.

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::BufRead,
    str::FromStr,
    time::Instant,
};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Hand,
    Eye,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hand => "hand",
            Self::Eye => "eye",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hand" => Ok(Self::Hand),
            "eye" | "face" => Ok(Self::Eye),
            other => Err(format!("unknown modality '{other}' (expected hand|eye)")),
        }
    }
}

/// 21-point hand skeleton indices.
pub mod hand {
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_PIP: usize = 14;
    pub const RING_TIP: usize = 16;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_TIP: usize = 20;

    /// (tip, proximal joint) for thumb, index, middle, ring, pinky.
    pub const FINGERS: [(usize, usize); 5] = [
        (THUMB_TIP, THUMB_IP),
        (INDEX_TIP, INDEX_PIP),
        (MIDDLE_TIP, MIDDLE_PIP),
        (RING_TIP, RING_PIP),
        (PINKY_TIP, PINKY_PIP),
    ];

    pub const POINT_COUNT: usize = 21;
}

/// Subset of the refined face mesh used for eyes, iris and mouth.
pub mod face {
    #[derive(Debug, Clone, Copy)]
    pub struct EyeIndices {
        pub top: usize,
        pub bottom: usize,
        pub outer: usize,
        pub inner: usize,
    }

    pub const LEFT_EYE: EyeIndices = EyeIndices {
        top: 386,
        bottom: 374,
        outer: 263,
        inner: 362,
    };

    pub const RIGHT_EYE: EyeIndices = EyeIndices {
        top: 159,
        bottom: 145,
        outer: 33,
        inner: 133,
    };

    pub const TRACKED_IRIS: usize = 474;
    pub const UPPER_LIP: usize = 13;
    pub const LOWER_LIP: usize = 14;

    pub const POINT_COUNT: usize = 478;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

/// One detector output. Coordinates are normalized to `[0, 1]` of the camera
/// image; `width`/`height` give the camera size in pixels.
#[derive(Debug, Clone)]
pub struct LandmarkFrame {
    pub timestamp: f64,
    pub width: f32,
    pub height: f32,
    pub points: Vec<Landmark>,
}

impl LandmarkFrame {
    /// No subject (hand or face) was found in this frame.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn mirror(&mut self) {
        for p in &mut self.points {
            p.x = 1.0 - p.x;
        }
    }
}

/// What a source can hand the session besides a frame.
#[derive(Debug, Clone)]
pub enum SourceItem {
    Frame(LandmarkFrame),
    Calibrate,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record {
    Frame {
        t: Option<f64>,
        width: Option<f32>,
        height: Option<f32>,
        #[serde(default)]
        landmarks: Vec<Landmark>,
    },
    NoFrame,
    Calibrate,
}

pub trait LandmarkSource {
    /// `None` once the stream is exhausted.
    fn next_item(&mut self) -> Option<Result<SourceItem, SessionError>>;
}

/// Newline-delimited JSON records, one per captured frame.
pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
    camera: (f32, f32),
    mirror: bool,
    started: Instant,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R, camera: (f32, f32), mirror: bool) -> Self {
        Self {
            reader,
            line: String::new(),
            camera,
            mirror,
            started: Instant::now(),
        }
    }

    fn parse(&self, text: &str) -> Result<SourceItem, SessionError> {
        let rec: Record = serde_json::from_str(text)
            .map_err(|e| SessionError::MalformedFrame(e.to_string()))?;
        match rec {
            Record::NoFrame => Err(SessionError::CaptureUnavailable),
            Record::Calibrate => Ok(SourceItem::Calibrate),
            Record::Frame {
                t,
                width,
                height,
                landmarks,
            } => {
                let width = width.unwrap_or(self.camera.0);
                let height = height.unwrap_or(self.camera.1);
                if width <= 0.0 || height <= 0.0 {
                    return Err(SessionError::MalformedFrame(format!(
                        "non-positive frame size {width}x{height}"
                    )));
                }
                let mut frame = LandmarkFrame {
                    timestamp: t.unwrap_or_else(|| self.started.elapsed().as_secs_f64()),
                    width,
                    height,
                    points: landmarks,
                };
                if self.mirror {
                    frame.mirror();
                }
                Ok(SourceItem::Frame(frame))
            }
        }
    }
}

impl<R: BufRead> LandmarkSource for JsonLinesSource<R> {
    fn next_item(&mut self) -> Option<Result<SourceItem, SessionError>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(SessionError::Source(e))),
            }
            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            return Some(self.parse(text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(text: &str) -> JsonLinesSource<Cursor<Vec<u8>>> {
        JsonLinesSource::new(Cursor::new(text.as_bytes().to_vec()), (640.0, 480.0), false)
    }

    #[test]
    fn parses_frames_and_control_records() {
        let mut src = source(
            r#"{"kind":"frame","t":0.5,"landmarks":[{"x":0.25,"y":0.5}]}

{"kind":"no_frame"}
{"kind":"calibrate"}
"#,
        );

        match src.next_item() {
            Some(Ok(SourceItem::Frame(f))) => {
                assert_eq!(f.timestamp, 0.5);
                assert_eq!((f.width, f.height), (640.0, 480.0));
                assert_eq!(f.points.len(), 1);
                assert_eq!(f.points[0].z, 0.0);
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(matches!(
            src.next_item(),
            Some(Err(SessionError::CaptureUnavailable))
        ));
        assert!(matches!(src.next_item(), Some(Ok(SourceItem::Calibrate))));
        assert!(src.next_item().is_none());
    }

    #[test]
    fn garbage_line_is_a_malformed_frame_not_the_end() {
        let mut src = source("not json\n{\"kind\":\"frame\",\"t\":1.0}\n");
        assert!(matches!(
            src.next_item(),
            Some(Err(SessionError::MalformedFrame(_)))
        ));
        match src.next_item() {
            Some(Ok(SourceItem::Frame(f))) => assert!(f.is_empty()),
            other => panic!("expected empty frame, got {other:?}"),
        }
    }

    #[test]
    fn mirroring_flips_x_only() {
        let mut src = JsonLinesSource::new(
            Cursor::new(br#"{"kind":"frame","t":0,"landmarks":[{"x":0.2,"y":0.7}]}"#.to_vec()),
            (640.0, 480.0),
            true,
        );
        match src.next_item() {
            Some(Ok(SourceItem::Frame(f))) => {
                assert!((f.points[0].x - 0.8).abs() < 1e-6);
                assert!((f.points[0].y - 0.7).abs() < 1e-6);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn modality_parses_aliases() {
        assert_eq!("Hand".parse::<Modality>(), Ok(Modality::Hand));
        assert_eq!("face".parse::<Modality>(), Ok(Modality::Eye));
        assert!("foot".parse::<Modality>().is_err());
    }
}
