//! In-memory entity repository.
//!
//! One mutex per table; every read-modify-write runs as a closure under the
//! table lock, so racing transitions on the same row serialize and the
//! loser observes `InvalidTransition` instead of clobbering state.

use std::collections::HashMap;
use std::sync::Mutex;

use clipforge_models::{
    Chunk, ChunkId, Clip, ClipId, Stream, StreamId, Streamer, StreamerId,
};

use crate::error::{WorkerError, WorkerResult};

/// Repository of pipeline entities.
#[derive(Default)]
pub struct EntityRepo {
    streamers: Mutex<HashMap<StreamerId, Streamer>>,
    streams: Mutex<HashMap<StreamId, Stream>>,
    chunks: Mutex<HashMap<ChunkId, Chunk>>,
    clips: Mutex<HashMap<ClipId, Clip>>,
}

impl EntityRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_streamer(&self, streamer: Streamer) {
        self.streamers
            .lock()
            .expect("streamer lock poisoned")
            .insert(streamer.id.clone(), streamer);
    }

    pub fn get_streamer(&self, id: &StreamerId) -> Option<Streamer> {
        self.streamers
            .lock()
            .expect("streamer lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn insert_stream(&self, stream: Stream) {
        self.streams
            .lock()
            .expect("stream lock poisoned")
            .insert(stream.id.clone(), stream);
    }

    pub fn get_stream(&self, id: &StreamId) -> Option<Stream> {
        self.streams
            .lock()
            .expect("stream lock poisoned")
            .get(id)
            .cloned()
    }

    /// Mutate a stream under the table lock.
    pub fn update_stream<T>(
        &self,
        id: &StreamId,
        f: impl FnOnce(&mut Stream) -> WorkerResult<T>,
    ) -> WorkerResult<T> {
        let mut streams = self.streams.lock().expect("stream lock poisoned");
        let stream = streams
            .get_mut(id)
            .ok_or_else(|| WorkerError::entity_not_found("stream", id.as_str()))?;
        f(stream)
    }

    /// Delete a stream, cascading to its chunks and clips.
    pub fn delete_stream(&self, id: &StreamId) -> WorkerResult<Stream> {
        let removed = self
            .streams
            .lock()
            .expect("stream lock poisoned")
            .remove(id)
            .ok_or_else(|| WorkerError::entity_not_found("stream", id.as_str()))?;
        self.chunks
            .lock()
            .expect("chunk lock poisoned")
            .retain(|_, chunk| chunk.stream_id != *id);
        self.clips
            .lock()
            .expect("clip lock poisoned")
            .retain(|_, clip| clip.stream_id != *id);
        Ok(removed)
    }

    pub fn insert_chunk(&self, chunk: Chunk) {
        self.chunks
            .lock()
            .expect("chunk lock poisoned")
            .insert(chunk.id.clone(), chunk);
    }

    pub fn get_chunk(&self, id: &ChunkId) -> Option<Chunk> {
        self.chunks
            .lock()
            .expect("chunk lock poisoned")
            .get(id)
            .cloned()
    }

    /// Mutate a chunk under the table lock.
    pub fn update_chunk<T>(
        &self,
        id: &ChunkId,
        f: impl FnOnce(&mut Chunk) -> WorkerResult<T>,
    ) -> WorkerResult<T> {
        let mut chunks = self.chunks.lock().expect("chunk lock poisoned");
        let chunk = chunks
            .get_mut(id)
            .ok_or_else(|| WorkerError::entity_not_found("chunk", id.as_str()))?;
        f(chunk)
    }

    /// Delete a chunk; clips keep their window but lose the back-reference.
    pub fn delete_chunk(&self, id: &ChunkId) -> WorkerResult<Chunk> {
        let removed = self
            .chunks
            .lock()
            .expect("chunk lock poisoned")
            .remove(id)
            .ok_or_else(|| WorkerError::entity_not_found("chunk", id.as_str()))?;
        let mut clips = self.clips.lock().expect("clip lock poisoned");
        for clip in clips.values_mut() {
            if clip.chunk_id.as_ref() == Some(id) {
                clip.chunk_id = None;
            }
        }
        Ok(removed)
    }

    /// Chunks of one stream, ordered by start time.
    pub fn chunks_for_stream(&self, stream_id: &StreamId) -> Vec<Chunk> {
        let chunks = self.chunks.lock().expect("chunk lock poisoned");
        let mut matching: Vec<Chunk> = chunks
            .values()
            .filter(|chunk| chunk.stream_id == *stream_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matching
    }

    pub fn insert_clip(&self, clip: Clip) {
        self.clips
            .lock()
            .expect("clip lock poisoned")
            .insert(clip.id.clone(), clip);
    }

    pub fn get_clip(&self, id: &ClipId) -> Option<Clip> {
        self.clips
            .lock()
            .expect("clip lock poisoned")
            .get(id)
            .cloned()
    }

    /// Mutate a clip under the table lock.
    pub fn update_clip<T>(
        &self,
        id: &ClipId,
        f: impl FnOnce(&mut Clip) -> WorkerResult<T>,
    ) -> WorkerResult<T> {
        let mut clips = self.clips.lock().expect("clip lock poisoned");
        let clip = clips
            .get_mut(id)
            .ok_or_else(|| WorkerError::entity_not_found("clip", id.as_str()))?;
        f(clip)
    }

    /// Clips of one stream, ordered by creation time.
    pub fn clips_for_stream(&self, stream_id: &StreamId) -> Vec<Clip> {
        let clips = self.clips.lock().expect("clip lock poisoned");
        let mut matching: Vec<Clip> = clips
            .values()
            .filter(|clip| clip.stream_id == *stream_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching
    }

    /// Whether any clip was carved from the given chunk.
    pub fn clip_exists_for_chunk(&self, chunk_id: &ChunkId) -> bool {
        let clips = self.clips.lock().expect("clip lock poisoned");
        clips
            .values()
            .any(|clip| clip.chunk_id.as_ref() == Some(chunk_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{ChunkStatus, Platform, StreamStatus};

    fn seeded() -> (EntityRepo, Stream, Chunk, Clip) {
        let repo = EntityRepo::new();
        let stream = Stream::new(StreamerId::new(), "https://example.test/vod/1", Platform::Twitch);
        let chunk = Chunk::new(stream.id.clone(), 0, 0.0, 30.0).unwrap();
        let clip = Clip::new(stream.id.clone(), chunk.id.clone(), 5.0, 25.0);
        repo.insert_stream(stream.clone());
        repo.insert_chunk(chunk.clone());
        repo.insert_clip(clip.clone());
        (repo, stream, chunk, clip)
    }

    #[test]
    fn test_update_closure_applies_under_lock() {
        let (repo, stream, _, _) = seeded();
        repo.update_stream(&stream.id, |s| {
            s.transition(StreamStatus::Downloading)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            repo.get_stream(&stream.id).unwrap().status,
            StreamStatus::Downloading
        );
    }

    #[test]
    fn test_update_missing_entity() {
        let repo = EntityRepo::new();
        let err = repo
            .update_chunk(&ChunkId::new(), |c| {
                c.transition(ChunkStatus::Processing)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, WorkerError::EntityNotFound { .. }));
    }

    #[test]
    fn test_delete_stream_cascades() {
        let (repo, stream, chunk, clip) = seeded();
        repo.delete_stream(&stream.id).unwrap();
        assert!(repo.get_stream(&stream.id).is_none());
        assert!(repo.get_chunk(&chunk.id).is_none());
        assert!(repo.get_clip(&clip.id).is_none());
    }

    #[test]
    fn test_delete_chunk_nulls_clip_backref() {
        let (repo, _, chunk, clip) = seeded();
        repo.delete_chunk(&chunk.id).unwrap();
        let clip = repo.get_clip(&clip.id).unwrap();
        assert!(clip.chunk_id.is_none());
        // Window survives the deleted source.
        assert_eq!(clip.start_time, 5.0);
    }

    #[test]
    fn test_chunks_ordered_by_start_time() {
        let repo = EntityRepo::new();
        let stream_id = StreamId::new();
        for (index, start) in [(2u32, 60.0), (0, 0.0), (1, 30.0)] {
            repo.insert_chunk(Chunk::new(stream_id.clone(), index, start, start + 30.0).unwrap());
        }
        let chunks = repo.chunks_for_stream(&stream_id);
        let starts: Vec<f64> = chunks.iter().map(|c| c.start_time).collect();
        assert_eq!(starts, vec![0.0, 30.0, 60.0]);
    }
}
