//! HTML pages.
//!
//! The pages speak the JSON event protocol over a plain browser WebSocket.
//! Audio is chosen and played entirely in the receiver's browser.

use cuecast_core::RoomCode;

const STYLE: &str = r#"
<style>
  body { font-family: -apple-system, BlinkMacSystemFont, sans-serif; max-width: 480px; margin: 40px auto; padding: 0 16px; text-align: center; }
  .code { font-size: 48px; font-weight: bold; letter-spacing: 8px; margin: 16px 0; }
  button { font-size: 20px; padding: 12px 24px; border-radius: 8px; border: none; background: #007aff; color: white; }
  button:disabled { background: #ccc; }
  input { font-size: 24px; text-transform: uppercase; text-align: center; width: 200px; }
  .hidden { display: none; }
</style>
"#;

const SOCKET_JS: &str = r#"
function connect(path, handlers, onOpen) {
  const scheme = location.protocol === 'https:' ? 'wss' : 'ws';
  const socket = new WebSocket(`${scheme}://${location.host}${path}`);
  socket.onopen = onOpen;
  socket.onmessage = (msg) => {
    const frame = JSON.parse(msg.data);
    const handler = handlers[frame.event];
    if (handler) handler(frame.data || {});
  };
  socket.emit = (event, data) => socket.send(JSON.stringify({ event, data }));
  return socket;
}
"#;

/// Landing page.
#[must_use]
pub fn index() -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>cuecast</title>{STYLE}</head>
<body>
  <h1>cuecast</h1>
  <p>Trigger sound on many devices from one.</p>
  <p><a href="/controller"><button>Create a room</button></a></p>
  <p><a href="/receiver"><button>Join a room</button></a></p>
</body>
</html>"#
    )
}

/// Controller page for a freshly allocated room.
#[must_use]
pub fn controller(code: &RoomCode, ws_path: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>cuecast controller</title>{STYLE}</head>
<body>
  <h1>Controller</h1>
  <p>Room code</p>
  <div class="code" id="roomCode">{code}</div>
  <p><span id="status">Connecting...</span> &middot; Receivers: <strong id="receiverCount">0</strong></p>
  <button id="playButton" disabled>PLAY SOUND</button>
  <script>
  {SOCKET_JS}
  const roomCode = '{code}';
  let receivers = 0;
  const button = document.getElementById('playButton');
  const socket = connect('{ws_path}', {{
    receiver_update: (data) => {{
      receivers = data.count;
      document.getElementById('receiverCount').textContent = receivers;
      button.disabled = receivers === 0;
    }},
  }}, () => {{
    document.getElementById('status').textContent = 'Connected';
    socket.emit('controller_join', {{ room_code: roomCode }});
  }});
  socket.onclose = () => {{
    document.getElementById('status').textContent = 'Disconnected';
    button.disabled = true;
  }};
  button.onclick = () => socket.emit('play_sound', {{ room_code: roomCode }});
  </script>
</body>
</html>"#
    )
}

/// Receiver join page.
#[must_use]
pub fn receiver(ws_path: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>cuecast receiver</title>{STYLE}</head>
<body>
  <h1>Receiver</h1>
  <form id="joinSection">
    <input id="roomCodeInput" maxlength="6" placeholder="ROOM CODE" required>
    <button type="submit">Join</button>
  </form>
  <div id="audioSection" class="hidden">
    <p>Room <strong id="currentRoom"></strong></p>
    <input type="file" id="audioFile" accept="audio/*">
    <audio id="audioPlayer" controls style="width: 100%; margin-top: 10px;"></audio>
    <p><button id="leaveButton">Leave room</button></p>
  </div>
  <script>
  {SOCKET_JS}
  let currentRoom = null;
  const player = document.getElementById('audioPlayer');
  const show = (joined) => {{
    document.getElementById('joinSection').classList.toggle('hidden', joined);
    document.getElementById('audioSection').classList.toggle('hidden', !joined);
  }};
  const leave = () => {{
    if (currentRoom) socket.emit('receiver_leave', {{ room_code: currentRoom }});
    currentRoom = null;
    show(false);
  }};
  const socket = connect('{ws_path}', {{
    join_success: (data) => {{
      currentRoom = data.room_code;
      document.getElementById('currentRoom').textContent = currentRoom;
      show(true);
    }},
    join_error: (data) => alert(data.message),
    play_command: () => {{ if (player.src) player.play(); }},
    room_closed: () => {{
      alert('The controller has closed this room.');
      currentRoom = null;
      show(false);
    }},
  }});
  document.getElementById('joinSection').onsubmit = (event) => {{
    event.preventDefault();
    const code = document.getElementById('roomCodeInput').value.toUpperCase();
    socket.emit('receiver_join', {{ room_code: code }});
  }};
  document.getElementById('audioFile').onchange = (event) => {{
    const file = event.target.files[0];
    if (file) player.src = URL.createObjectURL(file);
  }};
  document.getElementById('leaveButton').onclick = leave;
  </script>
</body>
</html>"#
    )
}
