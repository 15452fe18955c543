//! Scripts executed in the page through WebDriver.
//!
//! Element arguments arrive as WebDriver element references, which the driver hands to the
//! script as live DOM nodes.

/// Injects the chat widget: prompt input, reply area and suggestion list.
/// `arguments[0]` is the greeting shown before the first reply.
///
/// Enter (or a suggestion click) marks the prompt as submitted; [`POLL_PROMPT`] collects it.
pub fn widget_ui() -> String {
    r#"
    (function(greeting) {
        if (document.getElementById('pilot-widget')) return;

        const style = document.createElement('style');
        style.textContent = `
            #pilot-widget {
                position: fixed;
                bottom: 20px;
                left: 20px;
                z-index: 9999;
                display: flex;
                flex-direction: column;
                gap: 12px;
                font-family: sans-serif;
            }

            .pilot-box {
                width: 340px;
                padding: 12px;
                background: rgba(0, 0, 0, 0.0);
                color: red;
                border-radius: 10px;
                font-size: 14px;
            }

            #pilot-prompt-input {
                width: 100%;
                padding: 10px;
                border: 1px solid red;
                border-radius: 8px;
                background: rgba(0, 0, 0, 0.2);
                color: red;
                font-size: 14px;
            }

            #pilot-output {
                width: 100%;
                max-height: 180px;
                overflow-y: auto;
                white-space: pre-wrap;
                background: rgba(0, 0, 0, 0.2);
                border: 1px solid red;
                color: red;
                font-size: 13px;
                padding: 10px;
                border-radius: 8px;
                font-family: monospace;
            }

            #pilot-suggestions {
                display: flex;
                flex-wrap: wrap;
                gap: 6px;
            }

            #pilot-suggestions button {
                border: 1px solid red;
                border-radius: 12px;
                background: transparent;
                color: red;
                padding: 4px 10px;
                cursor: pointer;
            }

            .pilot-cursor {
                position: fixed;
                left: 50%;
                top: 50%;
                transform: translate(-50%, -50%);
                font-size: 2rem;
                z-index: 10000;
                pointer-events: none;
            }
        `;
        document.head.appendChild(style);

        const wrapper = document.createElement('div');
        wrapper.id = 'pilot-widget';

        const outputBox = document.createElement('div');
        outputBox.className = 'pilot-box';
        const output = document.createElement('div');
        output.id = 'pilot-output';
        output.textContent = greeting || '';
        outputBox.appendChild(output);
        wrapper.appendChild(outputBox);

        const suggestions = document.createElement('div');
        suggestions.id = 'pilot-suggestions';
        suggestions.className = 'pilot-box';
        wrapper.appendChild(suggestions);

        const promptBox = document.createElement('div');
        promptBox.className = 'pilot-box';
        const input = document.createElement('input');
        input.id = 'pilot-prompt-input';
        input.placeholder = 'Prompt...';
        input.type = 'text';
        promptBox.appendChild(input);
        wrapper.appendChild(promptBox);

        document.body.appendChild(wrapper);

        input.addEventListener('keydown', function(e) {
            if (e.key === 'Enter') {
                e.preventDefault();
                input.setAttribute('data-submitted', 'true');
            }
        });

        suggestions.addEventListener('click', function(e) {
            const chip = e.target.closest('button');
            if (!chip) return;
            input.value = chip.textContent;
            input.setAttribute('data-submitted', 'true');
        });
    })(arguments[0]);
    "#
    .to_string()
}

/// Returns the submitted prompt and clears the input, or `null` when nothing is pending.
pub const POLL_PROMPT: &str = r#"
    const input = document.getElementById('pilot-prompt-input');
    if (!input || input.getAttribute('data-submitted') !== 'true') return null;
    const text = input.value;
    input.value = '';
    input.removeAttribute('data-submitted');
    return text;
"#;

/// `arguments[0]`: display text, `arguments[1]`: suggestion strings.
pub const RENDER_REPLY: &str = r#"
    const output = document.getElementById('pilot-output');
    const list = document.getElementById('pilot-suggestions');
    if (!output || !list) return false;
    output.textContent = arguments[0];
    output.scrollTop = output.scrollHeight;
    list.replaceChildren(...arguments[1].map(text => {
        const chip = document.createElement('button');
        chip.type = 'button';
        chip.textContent = text;
        return chip;
    }));
    return true;
"#;

/// Every element in document order, as `SnapshotNode` records.
pub const SNAPSHOT: &str = r#"
    const KEPT = ['id', 'class', 'role', 'href', 'title', 'aria-label',
                  'data-testid', 'data-test', 'data-cy', 'name', 'type', 'value'];
    const elements = Array.from(document.querySelectorAll('*'));
    const index = new Map(elements.map((el, i) => [el, i]));
    const hidden = [];
    return elements.map((el, i) => {
        const attrs = {};
        for (const name of KEPT) {
            const value = el.getAttribute(name);
            if (value !== null) attrs[name] = value;
        }
        const rect = el.getBoundingClientRect();
        const parent = el.parentElement ? index.get(el.parentElement) : undefined;
        hidden[i] = (parent !== undefined && hidden[parent])
            || getComputedStyle(el).display === 'none';
        return {
            tag: el.tagName.toLowerCase(),
            parent: parent === undefined ? null : parent,
            attrs,
            text: (el.innerText || '').trim(),
            width: rect.width,
            height: rect.height,
            hidden: hidden[i]
        };
    });
"#;

pub const BOUNDING_BOX: &str = r#"
    const rect = arguments[0].getBoundingClientRect();
    return { x: rect.left, y: rect.top, width: rect.width, height: rect.height };
"#;

pub const VIEWPORT: &str = r#"
    return { width: window.innerWidth, height: window.innerHeight };
"#;

/// `arguments[1]` is the event name.
pub const DISPATCH: &str = r#"
    const el = arguments[0];
    switch (arguments[1]) {
        case 'click': el.click(); break;
        case 'focus': el.focus(); break;
        case 'blur': el.blur(); break;
        case 'pointerdown':
        case 'pointerup':
            el.dispatchEvent(new PointerEvent(arguments[1], { bubbles: true }));
            break;
        default:
            el.dispatchEvent(new Event(arguments[1], { bubbles: true }));
    }
"#;

pub const READ_VALUE: &str = r#"
    const value = arguments[0].value;
    return value === undefined || value === null ? '' : String(value);
"#;

/// Uses the prototype setter so framework-managed inputs see the change.
pub const WRITE_VALUE: &str = r#"
    const el = arguments[0];
    const proto = Object.getPrototypeOf(el);
    const setter = Object.getOwnPropertyDescriptor(proto, 'value');
    if (setter && setter.set) {
        setter.set.call(el, arguments[1]);
    } else {
        el.value = arguments[1];
    }
"#;

pub const HIGHLIGHT: &str = r#"
    const el = arguments[0];
    if (arguments[1]) {
        if (el.dataset.pilotOutline === undefined) {
            el.dataset.pilotOutline = el.style.outline;
        }
        el.style.outline = '2px solid #6366f1';
    } else if (el.dataset.pilotOutline !== undefined) {
        el.style.outline = el.dataset.pilotOutline;
        delete el.dataset.pilotOutline;
    }
"#;

/// `arguments[0]`: one of `show`, `move`, `press`, `remove`; then x, y and duration in ms.
pub const CURSOR: &str = r#"
    let cursor = document.getElementById('pilot-cursor');
    const [op, x, y, ms] = arguments;
    if (op === 'show') {
        if (cursor) cursor.remove();
        cursor = document.createElement('div');
        cursor.id = 'pilot-cursor';
        cursor.className = 'pilot-cursor';
        cursor.textContent = '👆';
        cursor.style.left = x + 'px';
        cursor.style.top = y + 'px';
        document.body.appendChild(cursor);
        return;
    }
    if (!cursor) return;
    if (op === 'move') {
        cursor.style.transition = 'all ' + ms + 'ms cubic-bezier(0.22, 1, 0.36, 1)';
        cursor.style.left = x + 'px';
        cursor.style.top = y + 'px';
    } else if (op === 'press') {
        cursor.style.transform = 'translate(-50%, -50%) scale(0.8)';
    } else if (op === 'remove') {
        cursor.remove();
    }
"#;
