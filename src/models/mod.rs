//! Core data models for the video file service.
//!
//! `StoredVideoFile` describes a payload that exists on disk, and
//! `UploadCandidate` carries an untrusted upload until it is validated and
//! copied under a freshly generated name.

pub mod video;
