use melody_common::{time, LikedTrack, TrackRef};

pub fn track(id: &str) -> TrackRef {
    TrackRef::new(id, format!("Track {}", id.to_uppercase())).with_subtitle("Test Artist")
}

pub fn liked(id: &str) -> LikedTrack {
    LikedTrack::from_track(&track(id), time::now())
}
