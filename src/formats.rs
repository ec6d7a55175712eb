//! Turns the extractor's heterogeneous raw format list into a deduplicated,
//! labeled, ranked set with a deterministic "best" pick. Pure: no I/O, no
//! mutation of the input, same output for the same input.

use crate::models::{NormalizedFormat, RawFormat};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Segmented-manifest protocols we cannot proxy as a plain byte stream.
/// m3u8_native is left in: its entries still carry direct media URLs.
const SKIPPED_PROTOCOLS: [&str; 4] = ["m3u8", "f4m", "f4f", "ism"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StreamClass {
    Merged,
    VideoOnly,
    AudioOnly,
}

impl StreamClass {
    fn rank(self) -> u8 {
        match self {
            StreamClass::Merged => 0,
            StreamClass::VideoOnly => 1,
            StreamClass::AudioOnly => 2,
        }
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if !c.is_empty() && c != "none")
}

fn video_quality(height: Option<i64>) -> String {
    match height {
        Some(h) if h >= 2160 => "4K".to_string(),
        Some(h) if h >= 1440 => "1440p".to_string(),
        Some(h) if h >= 1080 => "1080p".to_string(),
        Some(h) if h >= 720 => "720p".to_string(),
        Some(h) if h > 0 => format!("{h}p"),
        _ => "SD".to_string(),
    }
}

fn audio_quality(abr: Option<f64>, tbr: Option<f64>) -> String {
    let rate = abr.or(tbr).unwrap_or(0.0);
    if rate >= 256.0 {
        "High"
    } else if rate >= 128.0 {
        "Medium"
    } else {
        "Low"
    }
    .to_string()
}

fn build_label(quality: &str, ext: &str, class: StreamClass, format_id: &str) -> String {
    if quality.is_empty() && ext.is_empty() {
        return format_id.to_string();
    }
    match class {
        StreamClass::Merged => format!("{quality} · {ext}"),
        StreamClass::VideoOnly => format!("{quality} · {ext} · video only"),
        StreamClass::AudioOnly => format!("audio · {ext} · {quality}"),
    }
}

/// Primary and secondary ranking metrics within a class: resolution then
/// total bitrate for video classes, audio bitrate for the audio class.
/// Bitrates are scaled to integers so the comparison stays total.
fn sort_metrics(format: &NormalizedFormat, class: StreamClass) -> (i64, i64) {
    match class {
        StreamClass::AudioOnly => (
            (format.abr.or(format.tbr).unwrap_or(0.0) * 1000.0) as i64,
            0,
        ),
        _ => (
            format.height.unwrap_or(0),
            (format.tbr.unwrap_or(0.0) * 1000.0) as i64,
        ),
    }
}

fn compare(
    a: &(StreamClass, usize, NormalizedFormat),
    b: &(StreamClass, usize, NormalizedFormat),
) -> Ordering {
    a.0.rank().cmp(&b.0.rank()).then_with(|| {
        let (a_primary, a_secondary) = sort_metrics(&a.2, a.0);
        let (b_primary, b_secondary) = sort_metrics(&b.2, b.0);
        b_primary
            .cmp(&a_primary)
            .then(b_secondary.cmp(&a_secondary))
            .then_with(|| {
                b.2.filesize
                    .unwrap_or(0)
                    .cmp(&a.2.filesize.unwrap_or(0))
            })
            .then(a.1.cmp(&b.1))
    })
}

/// Normalizes a raw format list: filters undownloadable entries, classifies,
/// labels, deduplicates, sorts merged → video-only → audio-only, and marks
/// the top merged entry as best. When no merged format exists, nothing is
/// marked best.
pub fn normalize(raw_formats: &[RawFormat]) -> Vec<NormalizedFormat> {
    // (class, original extractor order, format)
    let mut entries: Vec<(StreamClass, usize, NormalizedFormat)> = Vec::new();
    let mut dedup: HashMap<(String, String, StreamClass), usize> = HashMap::new();

    for (order, raw) in raw_formats.iter().enumerate() {
        let Some(url) = raw.url.as_deref().filter(|u| !u.is_empty()) else {
            continue;
        };

        let ext = raw
            .ext
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or("mp4")
            .to_string();
        // Storyboards and other image/json pseudo-formats are not media.
        if ext == "mhtml" || ext == "json" {
            continue;
        }
        if matches!(raw.vcodec.as_deref(), Some(v) if v.to_lowercase().contains("storyboard")) {
            continue;
        }
        if matches!(raw.protocol.as_deref(), Some(p) if SKIPPED_PROTOCOLS.contains(&p)) {
            continue;
        }

        let has_video = codec_present(raw.vcodec.as_deref());
        let has_audio = codec_present(raw.acodec.as_deref());
        let class = match (has_video, has_audio) {
            (true, true) => StreamClass::Merged,
            (true, false) => StreamClass::VideoOnly,
            (false, true) => StreamClass::AudioOnly,
            // Neither codec: nothing meaningfully downloadable.
            (false, false) => continue,
        };

        let quality = if has_video {
            video_quality(raw.height)
        } else {
            audio_quality(raw.abr, raw.tbr)
        };
        let label = build_label(&quality, &ext, class, &raw.format_id);
        let filesize = raw
            .filesize
            .or(raw.filesize_approx)
            .filter(|s| *s > 0)
            .map(|s| s as u64);

        let format = NormalizedFormat {
            format_id: raw.format_id.clone(),
            label,
            quality: quality.clone(),
            extension: ext.clone(),
            filesize,
            is_audio: has_audio && !has_video,
            is_video_only: has_video && !has_audio,
            has_video,
            has_audio,
            is_best: false,
            height: raw.height,
            width: raw.width,
            fps: raw.fps,
            vcodec: raw.vcodec.as_deref().filter(|v| *v != "none").map(str::to_string),
            acodec: raw.acodec.as_deref().filter(|a| *a != "none").map(str::to_string),
            tbr: raw.tbr,
            abr: raw.abr,
            url: url.to_string(),
        };

        // Equal (quality, container, class) collapse to the entry with the
        // larger known size; ties keep first-seen.
        match dedup.get(&(quality.clone(), ext.clone(), class)) {
            Some(&index) => {
                if format.filesize.unwrap_or(0) > entries[index].2.filesize.unwrap_or(0) {
                    entries[index].2 = format;
                }
            }
            None => {
                dedup.insert((quality, ext, class), entries.len());
                entries.push((class, order, format));
            }
        }
    }

    entries.sort_by(compare);

    let mut formats: Vec<NormalizedFormat> = entries.into_iter().map(|(_, _, f)| f).collect();
    if let Some(first) = formats.first_mut() {
        if first.has_video && first.has_audio {
            first.is_best = true;
        }
    }
    formats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(id: &str, height: i64) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: Some("mp4".to_string()),
            vcodec: Some("h264".to_string()),
            acodec: Some("aac".to_string()),
            height: Some(height),
            url: Some(format!("https://cdn.example.com/{id}")),
            ..Default::default()
        }
    }

    fn video_only(id: &str, height: i64) -> RawFormat {
        RawFormat {
            acodec: Some("none".to_string()),
            ..merged(id, height)
        }
    }

    fn audio_only(id: &str, abr: f64) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: Some("m4a".to_string()),
            acodec: Some("aac".to_string()),
            abr: Some(abr),
            url: Some(format!("https://cdn.example.com/{id}")),
            ..Default::default()
        }
    }

    #[test]
    fn classifies_and_ranks_the_three_classes() {
        let raw = vec![
            audio_only("a", 128.0),
            merged("b", 1080),
            video_only("c", 720),
        ];
        let formats = normalize(&raw);

        assert_eq!(formats.len(), 3);
        assert_eq!(formats[0].format_id, "b");
        assert!(formats[0].is_best);
        assert!(formats[0].has_video && formats[0].has_audio);
        assert!(!formats[0].is_audio && !formats[0].is_video_only);

        assert_eq!(formats[1].format_id, "c");
        assert!(formats[1].is_video_only);
        assert!(!formats[1].is_best);

        assert_eq!(formats[2].format_id, "a");
        assert!(formats[2].is_audio);
        assert!(!formats[2].is_best);
    }

    #[test]
    fn merged_formats_are_never_flagged_audio_or_video_only() {
        let formats = normalize(&[merged("x", 480)]);
        assert_eq!(formats.len(), 1);
        assert!(!formats[0].is_audio);
        assert!(!formats[0].is_video_only);
    }

    #[test]
    fn no_best_without_a_merged_format() {
        let formats = normalize(&[video_only("v", 1080), audio_only("a", 160.0)]);
        assert!(formats.iter().all(|f| !f.is_best));
    }

    #[test]
    fn codecless_and_urlless_entries_are_dropped() {
        let raw = vec![
            RawFormat {
                format_id: "sb".to_string(),
                ext: Some("mhtml".to_string()),
                url: Some("https://cdn.example.com/sb".to_string()),
                ..Default::default()
            },
            RawFormat {
                format_id: "none".to_string(),
                ext: Some("mp4".to_string()),
                vcodec: Some("none".to_string()),
                acodec: Some("none".to_string()),
                url: Some("https://cdn.example.com/none".to_string()),
                ..Default::default()
            },
            RawFormat {
                url: None,
                ..merged("nourl", 720)
            },
            RawFormat {
                protocol: Some("m3u8".to_string()),
                ..merged("hls", 720)
            },
        ];
        assert!(normalize(&raw).is_empty());
    }

    #[test]
    fn video_resolutions_sort_descending() {
        let raw = vec![merged("low", 360), merged("hi", 2160), merged("mid", 1080)];
        let formats = normalize(&raw);
        let ids: Vec<&str> = formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, ["hi", "mid", "low"]);
        assert_eq!(formats[0].quality, "4K");
        assert_eq!(formats[1].quality, "1080p");
        assert_eq!(formats[2].quality, "360p");
        assert!(formats[0].is_best);
    }

    #[test]
    fn audio_tiers_follow_bitrate() {
        let raw = vec![
            audio_only("lo", 48.0),
            audio_only("hi", 320.0),
            audio_only("mid", 128.0),
        ];
        let formats = normalize(&raw);
        let qualities: Vec<&str> = formats.iter().map(|f| f.quality.as_str()).collect();
        assert_eq!(qualities, ["High", "Medium", "Low"]);
    }

    #[test]
    fn duplicate_quality_keeps_the_larger_size() {
        let bigger = RawFormat {
            filesize: Some(2_000_000),
            ..merged("big", 1080)
        };
        let smaller = RawFormat {
            filesize: Some(1_000_000),
            ..merged("small", 1080)
        };
        let formats = normalize(&[smaller, bigger]);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id, "big");
    }

    #[test]
    fn duplicate_size_ties_keep_first_seen() {
        let first = RawFormat {
            filesize: Some(1_000_000),
            ..merged("first", 1080)
        };
        let second = RawFormat {
            filesize: Some(1_000_000),
            ..merged("second", 1080)
        };
        let formats = normalize(&[first, second]);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id, "first");
    }

    #[test]
    fn non_positive_sizes_report_none() {
        let raw = RawFormat {
            filesize: Some(0),
            filesize_approx: Some(-5),
            ..merged("z", 720)
        };
        let formats = normalize(&[raw]);
        assert_eq!(formats[0].filesize, None);
    }

    #[test]
    fn missing_height_labels_as_sd() {
        let raw = RawFormat {
            height: None,
            ..merged("nh", 0)
        };
        let formats = normalize(&[raw]);
        assert_eq!(formats[0].quality, "SD");
        assert!(!formats[0].label.is_empty());
    }

    #[test]
    fn normalization_is_deterministic() {
        let raw = vec![
            audio_only("a", 128.0),
            merged("b", 1080),
            video_only("c", 720),
            merged("d", 720),
        ];
        assert_eq!(normalize(&raw), normalize(&raw));
    }
}
