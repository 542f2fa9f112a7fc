use bevy::{
    log::LogPlugin,
    prelude::*,
    render::{
        settings::{RenderCreation, WgpuFeatures, WgpuSettings},
        RenderPlugin,
    },
    window::WindowResolution,
};
use chunked_terrain::{map::load_map, TerrainPlugin};
use clap::Parser;
use std::{path::PathBuf, process::ExitCode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Real-time viewer for chunked-LOD heightfield maps.
#[derive(Parser)]
#[command(name = "terrain")]
struct Cli {
    /// Map directory containing `map.json` and one subdirectory per cell.
    map_dir: PathBuf,
}

fn main() -> ExitCode {
    // install the log subscriber before the Bevy app launches; the Bevy
    // LogPlugin is disabled below in its favor
    tracing_subscriber::registry()
        .with(fmt::layer().compact())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // a missing argument must exit with code 1, like a failed map load
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            let help = matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            );
            eprint!("{err}");
            return if help {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            };
        }
    };

    let (map, tqts) = match load_map(&cli.map_dir) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error loading map {}: {err:#}", cli.map_dir.display());
            return ExitCode::FAILURE;
        }
    };

    info!("controls:");
    info!("  Up/Down      look up/down");
    info!("  Left/Right   look left/right");
    info!("  B/N          roll the camera");
    info!("  Y/H          move forward/backward");
    info!("  G/J          move left/right");
    info!("  W            toggle wireframe");
    info!("  L            toggle lighting");
    info!("  F            toggle fog");
    info!("  R            toggle rain");
    info!("  +/-          tighten/relax the error tolerance");
    info!("  Esc/Q        quit");

    let title = map.name.clone();
    let result = App::new()
        .add_plugins(
            DefaultPlugins
                .build()
                .disable::<LogPlugin>()
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title,
                        resolution: WindowResolution::new(1024.0, 768.0),
                        ..default()
                    }),
                    ..default()
                })
                .set(RenderPlugin {
                    // wireframe rendering needs line polygon mode
                    render_creation: RenderCreation::Automatic(WgpuSettings {
                        features: WgpuFeatures::POLYGON_MODE_LINE,
                        ..default()
                    }),
                    ..default()
                }),
        )
        .insert_resource(map)
        .insert_resource(tqts)
        .add_plugins(TerrainPlugin)
        .run();

    match result {
        AppExit::Success => ExitCode::SUCCESS,
        AppExit::Error(code) => ExitCode::from(code.get()),
    }
}
