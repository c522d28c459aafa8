#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Star,
    Question,
    Literal(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '*' => Token::Star,
            '?' => Token::Question,
            // 末尾孤立的反斜杠按字面处理
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            other => Token::Literal(other),
        });
    }
    tokens
}

/// glob 匹配：`*` 匹配任意长度（含空），`?` 匹配单个字符，`\` 转义下一个字符
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let p = tokenize(pattern);
    let s: Vec<char> = candidate.chars().collect();

    let (mut pi, mut si) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while si < s.len() {
        match p.get(pi) {
            Some(Token::Question) => {
                pi += 1;
                si += 1;
            }
            Some(Token::Literal(c)) if *c == s[si] => {
                pi += 1;
                si += 1;
            }
            Some(Token::Star) => {
                star = Some(pi);
                mark = si;
                pi += 1;
            }
            _ => match star {
                // 回溯：让上一个 `*` 多吞一个字符
                Some(sp) => {
                    pi = sp + 1;
                    mark += 1;
                    si = mark;
                }
                None => return false,
            },
        }
    }

    while p.get(pi) == Some(&Token::Star) {
        pi += 1;
    }
    pi == p.len()
}

/// 转义 glob 元字符，使其在模式中按字面匹配
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 渲染依赖模式模板，支持 `{id}` 与 `{entityType}` 占位符；代入的值按字面转义
pub fn render_template(template: &str, entity_type: &str, entity_id: &str) -> String {
    template
        .replace("{entityType}", &escape_glob(entity_type))
        .replace("{id}", &escape_glob(entity_id))
}
