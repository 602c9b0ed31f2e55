//! List the codec registry.

use framecast_encoder::Codec;

pub fn run(json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<serde_json::Value> = Codec::all()
            .iter()
            .map(|codec| {
                let profile = codec.profile();
                serde_json::json!({
                    "id": codec.as_str(),
                    "extension": profile.extension,
                    "description": profile.description,
                    "audio": profile.supports_audio,
                    "alpha": profile.supports_alpha,
                    "default_crf": profile.crf.map(|c| c.default),
                    "crf_range": profile.crf.map(|c| [c.min, c.max]),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Registered codecs:");
    for codec in Codec::all() {
        let profile = codec.profile();
        let crf = match profile.crf {
            Some(c) => format!("crf {}..{} (default {})", c.min, c.max, c.default),
            None => "no crf".to_string(),
        };
        println!(
            "  {:8} .{:4} {}  [{}{}{}]",
            codec.as_str(),
            profile.extension,
            crf,
            if profile.supports_audio { "audio " } else { "" },
            if profile.supports_alpha { "alpha " } else { "" },
            profile.description,
        );
    }
    Ok(())
}
