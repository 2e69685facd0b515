use std::sync::Arc;

use cadenza_audio::{
    AudioError, CardStatus, DeviceNode, Direction, ManagerConfig, PcmFormat, StreamDeviceManager,
    StreamInfo, StreamPolicy, VirtualDriver,
};
use cadenza_focus::{FocusArbiter, FocusChange, FocusChangeListener, FocusGrant, FocusRequest};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

const OUT: DeviceNode = DeviceNode::new(0, 0, Direction::Output);

struct Session {
    _dir: tempfile::TempDir,
    driver: VirtualDriver,
    arbiter: Arc<FocusArbiter>,
    manager: Arc<StreamDeviceManager>,
}

fn session() -> anyhow::Result<Session> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir()?;
    let config = ManagerConfig {
        metadata_path: dir.path().join("audio_metadata.json"),
        period_size: 64,
        ..ManagerConfig::default()
    };
    let driver = VirtualDriver::standard();
    let arbiter = Arc::new(FocusArbiter::new()?);
    let manager = Arc::new(StreamDeviceManager::new(
        config,
        Arc::new(driver.clone()),
        Arc::clone(&arbiter),
    )?);
    manager.follow_player_focus();
    Ok(Session {
        _dir: dir,
        driver,
        arbiter,
        manager,
    })
}

type Log = Arc<Mutex<Vec<FocusChange>>>;

fn focus_request(id: u32, policy: StreamPolicy) -> (FocusRequest, Log, Arc<dyn FocusChangeListener>) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let listener: Arc<dyn FocusChangeListener> = Arc::new(move |change: FocusChange| sink.lock().push(change));
    let request = FocusRequest::builder()
        .stream_info(StreamInfo::new(id, policy))
        .listener(Arc::clone(&listener))
        .build();
    (request, log, listener)
}

#[test]
fn emergency_takes_over_media_playback() -> anyhow::Result<()> {
    let s = session()?;
    let m = &s.manager;
    let (media_req, media_log, _media_listener) = focus_request(1, StreamPolicy::Media);
    let (emergency_req, _log, _emergency_listener) = focus_request(2, StreamPolicy::Emergency);
    let media = media_req.stream_info();
    let emergency = emergency_req.stream_info();

    assert_eq!(s.arbiter.request_focus(&media_req)?, FocusGrant::Granted);
    m.set_stream_out(2, 48_000, PcmFormat::S16Le, media).unwrap();
    assert_eq!(m.start_stream_out(media.id, &[1000; 128]), Ok(64));
    assert_eq!(s.driver.hardware_volume(OUT), Some(84));

    assert_eq!(s.arbiter.request_focus(&emergency_req)?, FocusGrant::Granted);
    assert_eq!(*media_log.lock(), vec![FocusChange::Loss]);
    m.pause_stream_out(media.id).unwrap();
    assert_eq!(m.card_status(Direction::Output), Ok(CardStatus::Pause));

    // a stream that did not opt into mixing gives up the card
    m.set_stream_out(2, 48_000, PcmFormat::S16Le, emergency).unwrap();
    assert_eq!(m.output_mixer_gain(media.id), Err(AudioError::InvalidParam));
    assert_eq!(m.stream_policy(Direction::Output), Ok(StreamPolicy::Emergency));
    assert_eq!(s.driver.hardware_volume(OUT), Some(88));
    assert_eq!(m.start_stream_out(emergency.id, &[2000; 128]), Ok(64));

    m.stop_stream_out(emergency.id, true).unwrap();
    m.reset_stream_out(emergency.id).unwrap();
    s.arbiter.abandon_focus(&emergency_req);
    assert_eq!(*media_log.lock(), vec![FocusChange::Loss, FocusChange::Gain]);

    m.set_stream_out(2, 48_000, PcmFormat::S16Le, media).unwrap();
    assert_eq!(m.stream_policy(Direction::Output), Ok(StreamPolicy::Media));
    assert_eq!(s.driver.hardware_volume(OUT), Some(84));
    Ok(())
}

#[test]
fn ducked_media_mixes_under_a_notification() -> anyhow::Result<()> {
    let s = session()?;
    let m = &s.manager;
    let (media_req, media_log, _l1) = focus_request(1, StreamPolicy::Media);
    let (notify_req, _notify_log, _l2) = focus_request(2, StreamPolicy::Notify);
    let media = media_req.stream_info();
    let notify = notify_req.stream_info();

    s.arbiter.request_focus(&media_req)?;
    m.set_stream_out(2, 48_000, PcmFormat::S16Le, media).unwrap();
    m.set_output_audio_mixer(media.id).unwrap();

    s.arbiter.request_focus_transient(&notify_req)?;
    assert_eq!(*media_log.lock(), vec![FocusChange::LossTransientCanDuck]);
    m.set_stream_out(2, 48_000, PcmFormat::S16Le, notify).unwrap();
    m.set_output_audio_mixer(notify.id).unwrap();
    assert_eq!(m.stream_policy(Direction::Output), Ok(StreamPolicy::Notify));
    assert_eq!(m.output_mixer_gain(notify.id), Ok(1.0));
    assert!((m.output_mixer_gain(media.id).unwrap() - 0.3).abs() < 1e-6);

    // media is alone on the hardware until the notification starts
    m.start_stream_out(media.id, &[1000; 128]).unwrap();
    assert_eq!(s.driver.write_count(), 1);
    m.start_stream_out(notify.id, &[1000; 128]).unwrap();
    assert_eq!(s.driver.write_count(), 1);
    m.start_stream_out(media.id, &[1000; 128]).unwrap();
    assert_eq!(s.driver.write_count(), 2);
    let writes = s.driver.writes();
    let (_, mixed) = writes.last().unwrap();
    assert!(mixed.iter().all(|&sample| sample == 1300));

    // once the notification is done media is back at full gain
    m.stop_stream_out(notify.id, true).unwrap();
    m.reset_stream_out(notify.id).unwrap();
    s.arbiter.abandon_focus(&notify_req);
    assert_eq!(m.output_mixer_gain(media.id), Ok(1.0));
    assert_eq!(m.stream_policy(Direction::Output), Ok(StreamPolicy::Media));
    Ok(())
}

#[test]
fn deferred_volume_lands_when_its_policy_plays() -> anyhow::Result<()> {
    let s = session()?;
    let m = &s.manager;
    let media = StreamInfo::new(1, StreamPolicy::Media);
    m.set_stream_out(2, 48_000, PcmFormat::S16Le, media).unwrap();

    m.set_output_volume(4, StreamPolicy::Notify).unwrap();
    assert_eq!(s.driver.hardware_volume(OUT), Some(84));

    m.reset_stream_out(media.id).unwrap();
    let notify = StreamInfo::new(2, StreamPolicy::Notify);
    m.set_stream_out(2, 48_000, PcmFormat::S16Le, notify).unwrap();
    assert_eq!(s.driver.hardware_volume(OUT), Some(75));
    assert_eq!(m.output_volume(), Ok(4));
    Ok(())
}

#[test]
fn recorder_captures_at_cd_rate_from_a_wideband_card() -> anyhow::Result<()> {
    let s = session()?;
    let m = &s.manager;
    let (record_req, _log, _listener) = focus_request(9, StreamPolicy::VoiceRecord);
    assert_eq!(s.arbiter.request_focus(&record_req)?, FocusGrant::Granted);
    assert_eq!(s.arbiter.current_recorder_stream_info(), Some(record_req.stream_info()));
    assert_eq!(s.arbiter.current_player_stream_info(), None);

    s.driver.set_capture_value(500);
    m.set_stream_in(2, 44_100, PcmFormat::S16Le).unwrap();
    let mut data = vec![0i16; 441 * 2];
    let mut total = 0;
    for _ in 0..10 {
        total += m.start_stream_in(&mut data).unwrap();
    }
    assert!(total > 4000, "{total}");
    assert_eq!(m.card_status(Direction::Input), Ok(CardStatus::Running));

    m.stop_stream_in().unwrap();
    m.reset_stream_in().unwrap();
    s.arbiter.abandon_focus(&record_req);
    assert_eq!(s.arbiter.current_recorder_stream_info(), None);
    Ok(())
}
