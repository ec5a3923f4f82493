use std::time::Duration;

use castview_capture::{
    CaptureSource, CompositeCapture, CursorSprite, FrameGrabber, PatternSource, PixelFormat,
};

fn pixel(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [data[i], data[i + 1], data[i + 2], data[i + 3]]
}

#[test]
fn test_grabbed_composite_frames_carry_cursor() {
    let mut screen = PatternSource::new(32, 16);
    screen.set_animated(false);
    screen.set_position(100, 100);

    let cursor = CursorSprite::new([0, 0, 255, 255].repeat(4), 2, 2);
    let pointer = cursor.handle();
    pointer.move_to(110, 104);

    let mut composite = CompositeCapture::new(Box::new(screen), Box::new(cursor));
    let devices = composite.enumerate_devices().unwrap();
    composite.bind_device(&devices[0]).unwrap();

    let (mut grabber, rx) =
        FrameGrabber::spawn_channel(Box::new(composite), Duration::from_millis(1)).unwrap();

    let frame = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(frame.format, PixelFormat::Rgba);
    assert_eq!((frame.width, frame.height), (32, 16));
    assert_eq!(pixel(&frame.data, 32, 10, 4), [0, 0, 255, 255]);
    assert_eq!(pixel(&frame.data, 32, 11, 5), [0, 0, 255, 255]);

    pointer.move_to(120, 110);
    let moved = loop {
        let next = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        if pixel(&next.data, 32, 20, 10) == [0, 0, 255, 255] {
            break next;
        }
    };
    // The old position shows the clean pattern again.
    assert_ne!(pixel(&moved.data, 32, 10, 4), [0, 0, 255, 255]);

    assert!(grabber.stop().is_some());
}

#[test]
fn test_stopped_grabber_returns_rebindable_source() {
    let mut screen = PatternSource::new(8, 8);
    let devices = screen.enumerate_devices().unwrap();
    screen.bind_device(&devices[0]).unwrap();

    let mut grabber = FrameGrabber::spawn(Box::new(screen), Duration::from_millis(1), |_| {})
        .unwrap();
    while grabber.stats().frames() == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }

    let mut source = grabber.stop().unwrap();
    let devices = source.enumerate_devices().unwrap();
    source.bind_device(&devices[0]).unwrap();
    assert!(source.grab_frame().is_frame());
}
