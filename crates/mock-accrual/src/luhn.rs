//! 订单号 Luhn 校验
//!
//! 与 `loyalty_service::luhn` 的数值版本必须保持一致，两者由
//! loyalty-service 的 `test_agrees_with_mock_accrual` 交叉校验。

/// 只接受非空十进制数字串
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = number
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();

    sum % 10 == 0 && number.bytes().any(|b| b != b'0')
}
