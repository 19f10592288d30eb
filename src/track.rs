use std::fmt::Write as _;

use bytes::Bytes;

/// Which of the two per-track flows a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Rtp,
    Rtcp,
}

/// A single elementary stream offered by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Media kind as it appears in the session description, e.g. "video".
    pub media: String,
    /// RTP payload type.
    pub payload_type: u8,
    pub clock_rate: u32,
}

impl Track {
    pub fn video() -> Track {
        Track {
            media: String::from("video"),
            payload_type: 96,
            clock_rate: 90_000,
        }
    }

    pub fn audio() -> Track {
        Track {
            media: String::from("audio"),
            payload_type: 97,
            clock_rate: 48_000,
        }
    }
}

/// The set of tracks a source publishes on a path.
///
/// Announced by publishers and reported by external pullers once they are
/// connected to the upstream server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tracks(Vec<Track>);

impl Tracks {
    pub fn new(tracks: Vec<Track>) -> Tracks {
        Tracks(tracks)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize into the session description delivered to describers.
    ///
    /// The bytes are opaque to the path layer; subscribers consume them
    /// verbatim.
    pub fn write(&self) -> Bytes {
        let mut out = String::new();
        out.push_str("v=0\r\n");
        out.push_str("o=- 0 0 IN IP4 127.0.0.1\r\n");
        out.push_str("s=Stream\r\n");
        out.push_str("t=0 0\r\n");

        for (i, track) in self.0.iter().enumerate() {
            let _ = write!(out, "m={} 0 RTP/AVP {}\r\n", track.media, track.payload_type);
            let _ = write!(
                out,
                "a=rtpmap:{} {}/{}\r\n",
                track.payload_type, track.media, track.clock_rate
            );
            let _ = write!(out, "a=control:trackID={}\r\n", i);
        }

        Bytes::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_lists_every_track() {
        let tracks = Tracks::new(vec![Track::video(), Track::audio()]);
        assert_eq!(tracks.len(), 2);

        let sdp = String::from_utf8(tracks.write().to_vec()).unwrap();
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("m=video 0 RTP/AVP 96\r\n"));
        assert!(sdp.contains("m=audio 0 RTP/AVP 97\r\n"));
        assert!(sdp.contains("a=control:trackID=0\r\n"));
        assert!(sdp.contains("a=control:trackID=1\r\n"));
    }

    #[test]
    fn empty_tracks_still_describe_a_session() {
        let sdp = String::from_utf8(Tracks::default().write().to_vec()).unwrap();
        assert!(sdp.contains("s=Stream"));
        assert!(!sdp.contains("m="));
    }
}
