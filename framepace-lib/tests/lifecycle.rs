mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use framepace_lib::{Delivery, Player, PlayerEvent, PumpState};

use common::{
    audio, av_info, video, video_info, wait_for, Recorder, Script, ScriptedSink,
    ScriptedSinkProvider, Step,
};

const FINISH_TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn stop_mid_stream_tears_everything_down_once() {
    let script = Script::new(av_info(), vec![audio(0), video(0)]).endless(20_000);
    let recorder = Recorder::default();
    let sink = ScriptedSink::new(true, 0);
    let player = Player::builder(script.factory(), recorder.delivery())
        .sink_provider(ScriptedSinkProvider::new(sink.clone()))
        .build();

    assert!(player.start("scripted://endless"));
    assert!(wait_for(Duration::from_secs(2), || {
        player.state() == PumpState::Running
    }));
    std::thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    player.stop();
    assert!(started.elapsed() < Duration::from_millis(3000));

    assert!(!player.is_running());
    assert_eq!(player.state(), PumpState::Stopped);
    assert_eq!(script.log.opens.load(Ordering::SeqCst), 1);
    assert_eq!(script.log.closes.load(Ordering::SeqCst), 1);

    let calls = sink.calls();
    assert_eq!(sink.count("stop"), 1);
    assert_eq!(sink.count("drain"), 1);
    assert_eq!(sink.count("close"), 1);
    let position = |name: &str| calls.iter().position(|call| *call == name).unwrap();
    assert!(position("stop") < position("drain"));
    assert!(position("drain") < position("close"));

    let stats = player.stats();
    assert!(stats.iterations > 0);
    assert_eq!(stats.video.submitted, stats.video.released);
    assert_eq!(stats.audio.submitted, stats.audio.released);
    assert!(!recorder.event_names().contains(&"end".to_string()));

    // A second stop is a no-op.
    player.stop();
    assert_eq!(script.log.closes.load(Ordering::SeqCst), 1);
    assert_eq!(sink.count("close"), 1);
}

#[test]
fn start_while_running_is_ignored() {
    let script = Script::new(video_info(), vec![video(0)]).endless(40_000);
    let recorder = Recorder::default();
    let player = Player::builder(script.factory(), recorder.delivery()).build();

    assert!(player.start("scripted://first"));
    assert!(!player.start("scripted://second"));
    assert!(wait_for(Duration::from_secs(2), || player.is_running()));
    assert_eq!(script.log.opens.load(Ordering::SeqCst), 1);

    player.stop();
    assert_eq!(script.log.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn finished_player_starts_a_new_session() {
    let script = Script::new(video_info(), vec![video(0), video(10_000)]);
    let recorder = Recorder::default();
    let player = Player::builder(script.factory(), recorder.delivery()).build();

    assert!(player.start("scripted://once"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));
    assert!(player.start("scripted://twice"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));

    assert_eq!(script.log.opens.load(Ordering::SeqCst), 2);
    assert_eq!(script.log.closes.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.video_relatives(), vec![0, 10_000, 0, 10_000]);
}

#[test]
fn open_failure_is_reported_after_teardown() {
    let script = Script::failing_open("corrupt header");
    let recorder = Recorder::default();
    let player = Player::builder(script.factory(), recorder.delivery()).build();

    assert!(player.start("scripted://broken"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));

    assert_eq!(
        recorder.event_names(),
        vec!["error: failed to open source: unsupported media: corrupt header"]
    );
    assert_eq!(script.log.closes.load(Ordering::SeqCst), 1);
    assert_eq!(player.state(), PumpState::Stopped);
}

#[test]
fn read_failure_ends_the_session() {
    let script = Script::new(video_info(), vec![video(0), video(10_000)])
        .then(Step::Fail("truncated packet".to_string()))
        .then(Step::Frame(video(20_000)));
    let recorder = Recorder::default();
    let player = Player::builder(script.factory(), recorder.delivery()).build();

    assert!(player.start("scripted://truncated"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));

    assert_eq!(recorder.video_relatives(), vec![0, 10_000]);
    assert_eq!(
        recorder.event_names(),
        vec![
            "dimensions".to_string(),
            "started".to_string(),
            "error: failed to read frame: decode error: truncated packet".to_string(),
        ]
    );
    assert_eq!(script.log.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn every_duplicate_is_released_once_despite_consumer_failures() {
    let mut frames = Vec::new();
    for k in 0..6 {
        frames.push(audio(k * 10_000));
        frames.push(video(k * 10_000));
    }
    let script = Script::new(av_info(), frames);
    let delivery = Delivery::new(|_, relative| match relative {
        10_000 => Err("renderer busy".into()),
        20_000 => panic!("renderer crashed"),
        _ => Ok(()),
    })
    .with_audio(|_, _, _| Err("mixer offline".into()));
    let player = Player::builder(script.factory(), delivery).build();

    assert!(player.start("scripted://failing-consumers"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));

    let stats = player.stats();
    assert_eq!(stats.video.submitted, 6);
    assert_eq!(stats.video.released, 6);
    assert_eq!(stats.video.delivered, 4);
    assert_eq!(stats.video.failed, 2);
    assert_eq!(stats.audio.submitted, 6);
    assert_eq!(stats.audio.released, 6);
    assert_eq!(stats.audio.failed, 6);
}

#[test]
fn missing_audio_device_falls_back_to_video_only() {
    let mut frames = Vec::new();
    for k in 0..4 {
        frames.push(audio(k * 10_000));
        frames.push(video(k * 10_000));
    }
    let script = Script::new(av_info(), frames);
    let recorder = Recorder::default();
    let provider = ScriptedSinkProvider::failing();
    let player = Player::builder(script.factory(), recorder.delivery())
        .sink_provider(provider.clone())
        .build();

    assert!(player.start("scripted://no-device"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));

    assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.video_relatives(), vec![0, 10_000, 20_000, 30_000]);
    let stats = player.stats();
    assert_eq!(stats.audio.submitted, 0);
    assert!(!stats.device_clock_seen);
    assert_eq!(recorder.event_names(), vec!["dimensions", "started", "end"]);
}

#[test]
fn stop_from_end_of_media_event_returns_promptly() {
    let script = Script::new(video_info(), vec![video(0), video(10_000)]);
    let handle: Arc<OnceLock<Player>> = Arc::new(OnceLock::new());
    let stop_took: Arc<Mutex<Option<Duration>>> = Arc::new(Mutex::new(None));

    let delivery = {
        let handle = handle.clone();
        let stop_took = stop_took.clone();
        Delivery::new(|_, _| Ok(())).with_events(move |event| {
            if let PlayerEvent::EndOfMedia = event {
                if let Some(player) = handle.get() {
                    let started = Instant::now();
                    player.stop();
                    *stop_took.lock().unwrap() = Some(started.elapsed());
                }
            }
        })
    };
    let player = Player::builder(script.factory(), delivery).build();
    let _ = handle.set(player.clone());

    assert!(player.start("scripted://short"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));

    let took = stop_took.lock().unwrap().expect("stop was called");
    assert!(took < Duration::from_millis(500), "stop took {:?}", took);
    assert_eq!(player.state(), PumpState::Stopped);
    assert_eq!(script.log.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_from_video_consumer_ends_the_session() {
    let script = Script::new(video_info(), vec![video(0)]).endless(20_000);
    let handle: Arc<OnceLock<Player>> = Arc::new(OnceLock::new());
    let stop_took: Arc<Mutex<Option<Duration>>> = Arc::new(Mutex::new(None));

    let delivery = {
        let handle = handle.clone();
        let stop_took = stop_took.clone();
        Delivery::new(move |_, relative_us| {
            if relative_us >= 100_000 {
                if let Some(player) = handle.get() {
                    let started = Instant::now();
                    player.stop();
                    stop_took.lock().unwrap().get_or_insert(started.elapsed());
                }
            }
            Ok(())
        })
    };
    let player = Player::builder(script.factory(), delivery).build();
    let _ = handle.set(player.clone());

    assert!(player.start("scripted://endless"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));

    let took = stop_took.lock().unwrap().expect("stop was called");
    assert!(took < Duration::from_millis(500), "stop took {:?}", took);
    assert_eq!(player.state(), PumpState::Stopped);
    assert_eq!(script.log.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn read_failure_drains_before_stopping() {
    let script =
        Script::new(video_info(), vec![video(0)]).then(Step::Fail("lost sync".to_string()));
    let handle: Arc<OnceLock<Player>> = Arc::new(OnceLock::new());
    let states: Arc<Mutex<Vec<PumpState>>> = Arc::new(Mutex::new(Vec::new()));

    let delivery = {
        let handle = handle.clone();
        let states = states.clone();
        Delivery::new(move |_, _| {
            // Hold the video worker until the pump has given up on the source.
            if let Some(player) = handle.get() {
                let deadline = Instant::now() + Duration::from_secs(1);
                while player.state() != PumpState::Draining && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(2));
                }
                states.lock().unwrap().push(player.state());
            }
            Ok(())
        })
    };
    let player = Player::builder(script.factory(), delivery).build();
    let _ = handle.set(player.clone());

    assert!(player.start("scripted://lost-sync"));
    assert!(player.wait_until_finished(Some(FINISH_TIMEOUT)));

    assert_eq!(*states.lock().unwrap(), vec![PumpState::Draining]);
    assert_eq!(player.state(), PumpState::Stopped);
}
